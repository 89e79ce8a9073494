use kshim_probe::{
    detect, kernel, Capability, Classification, ConfigValue, Evidence, ProbeOpts,
};

fn main() {
    let opts = ProbeOpts::default();
    let Capability {
        config_key,
        header_name,
        marker,
    } = &opts.capability;

    let report = match detect(&opts) {
        Ok(report) => report,
        Err(err) => {
            println!("Error probing kernel: {}", err);
            println!("Verdict: {}", Classification::NotFound.describe());
            return;
        }
    };

    println!("Scanning kernel {}...", report.release);
    println!("Kernel source tree is {}", report.source.display());
    println!(
        "Source tree {} under /lib/modules/{}",
        if kernel::is_module_tree(&report.source, &report.release) {
            "is"
        } else {
            "is NOT"
        },
        report.release
    );

    match &report.evidence {
        Evidence::Config { path, value } => {
            println!("Kernel config found at {}", path.display());
            match value {
                Some(ConfigValue::Y) => println!("{} is built in", config_key),
                Some(value) => println!("{} is set to {}", config_key, value),
                None => println!("{} is not set", config_key),
            }
        }
        Evidence::Header { path, marker_found } => {
            println!("No kernel config found, inspecting headers");
            match path {
                Some(path) => {
                    println!("{} found at {}", header_name, path.display());
                    println!(
                        "Compatibility marker {} {} present",
                        marker,
                        if *marker_found { "is" } else { "is NOT" }
                    );
                }
                None => println!("{} is NOT available", header_name),
            }
        }
    }

    println!(
        "\nVerdict: {} (exit code {})",
        report.classification.describe(),
        report.classification.exit_code()
    );
}
