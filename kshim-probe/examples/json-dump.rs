use kshim_probe::{detect, ProbeOpts};

fn main() {
    let report = detect(&ProbeOpts::default()).unwrap();
    let json_dump = serde_json::to_string_pretty(&report).unwrap();
    println!("{}", json_dump)
}
