use kshim_probe::{detect, Classification, ConfigValue, DetectError, Evidence, ProbeOpts};
use std::{
    fs,
    path::PathBuf,
    process::Command,
};
use tempfile::TempDir;

const RELEASE: &str = "6.1.0-18-amd64";

const UPSTREAM_HEADER: &str = "\
#ifndef _AUXILIARY_BUS_H_
#define _AUXILIARY_BUS_H_
struct auxiliary_device;
#endif /* _AUXILIARY_BUS_H_ */
";

const SHIM_HEADER: &str = "\
#ifndef _AUXILIARY_COMPAT_H_
#define _AUXILIARY_COMPAT_H_
struct auxiliary_device;
#endif /* _AUXILIARY_COMPAT_H_ */
";

/// A fake target filesystem rooted in a temp dir
struct Target {
    root: TempDir,
}

impl Target {
    fn new() -> Self {
        Target {
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, absolute: &str) -> PathBuf {
        self.root.path().join(absolute.trim_start_matches('/'))
    }

    fn headers(&self, tree: &str) -> &Self {
        fs::create_dir_all(self.path(tree).join("include/linux")).unwrap();
        self
    }

    fn write(&self, absolute: &str, contents: &str) -> &Self {
        let path = self.path(absolute);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        self
    }

    fn opts(&self) -> ProbeOpts {
        ProbeOpts {
            build_kernel: Some(RELEASE.into()),
            root: self.root.path().to_path_buf(),
            ..ProbeOpts::default()
        }
    }

    fn module_build(&self) -> String {
        format!("/lib/modules/{}/build", RELEASE)
    }

    fn autoconf(&self, contents: &str) -> &Self {
        let build = self.module_build();
        self.headers(&build)
            .write(&format!("{}/include/generated/autoconf.h", build), contents)
    }
}

fn cli(args: &[&str]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_kshim-probe"));
    command
        .args(args)
        .env_remove("KSRC")
        .env_remove("BUILD_KERNEL")
        .env_remove("KSHIM_ROOT");
    command
}

fn exit_code(command: &mut Command) -> i32 {
    command.output().unwrap().status.code().unwrap()
}

fn run_cli(args: &[&str]) -> i32 {
    exit_code(&mut cli(args))
}

#[test]
fn first_candidate_wins() {
    let target = Target::new();
    target
        .headers("/usr/src/linux")
        .headers("/usr/src/linux-6.1")
        .headers("/usr/src/linux-6.1.0")
        .write("/usr/src/linux/include/linux/auxiliary_bus.h", SHIM_HEADER)
        .write("/usr/src/linux-6.1.0/include/linux/auxiliary_bus.h", UPSTREAM_HEADER);

    let report = detect(&target.opts()).unwrap();
    assert_eq!(report.source, target.path("/usr/src/linux-6.1.0"));
    assert_eq!(report.classification, Classification::Builtin);
}

#[test]
fn config_enabled_is_builtin() {
    let target = Target::new();
    target.autoconf("#define CONFIG_AUXILIARY_BUS 1\n");

    let report = detect(&target.opts()).unwrap();
    assert_eq!(report.classification, Classification::Builtin);
    assert_eq!(report.classification.exit_code(), 0);
}

#[test]
fn config_disabled_is_misconfigured() {
    let target = Target::new();
    target.autoconf("#define CONFIG_AUXILIARY_BUS 0\n");

    let report = detect(&target.opts()).unwrap();
    assert_eq!(
        report.evidence,
        Evidence::Config {
            path: target.path(&format!("{}/include/generated/autoconf.h", target.module_build())),
            value: Some(ConfigValue::Other("0".into())),
        }
    );
    assert_eq!(report.classification.exit_code(), 1);
}

#[test]
fn config_key_absent_needs_shim() {
    let target = Target::new();
    target.autoconf("#define CONFIG_NET 1\n#define CONFIG_AUXILIARY_BUS_EXTRA 1\n");

    let report = detect(&target.opts()).unwrap();
    assert_eq!(report.classification, Classification::OotRequired);
    assert_eq!(report.classification.exit_code(), 2);
}

#[test]
fn unrelated_source_never_reads_config() {
    let target = Target::new();
    target
        .autoconf("#define CONFIG_AUXILIARY_BUS 0\n")
        .headers("/opt/kernels/custom")
        .write(
            "/opt/kernels/custom/include/generated/autoconf.h",
            "#define CONFIG_AUXILIARY_BUS 0\n",
        )
        .write("/opt/kernels/custom/include/linux/auxiliary_bus.h", UPSTREAM_HEADER);

    let opts = ProbeOpts {
        ksrc: Some(target.path("/opt/kernels/custom")),
        ..target.opts()
    };
    let report = detect(&opts).unwrap();
    assert!(matches!(report.evidence, Evidence::Header { .. }));
    assert_eq!(report.classification, Classification::Builtin);
}

#[test]
fn no_config_and_no_header_needs_shim() {
    let target = Target::new();
    target.headers("/usr/src/kernels");

    let report = detect(&target.opts()).unwrap();
    assert_eq!(
        report.evidence,
        Evidence::Header {
            path: None,
            marker_found: false
        }
    );
    assert_eq!(report.classification.exit_code(), 2);
}

#[test]
fn installed_shim_header_needs_shim() {
    let target = Target::new();
    target
        .headers("/usr/src/linux")
        .write("/usr/src/linux/include/linux/auxiliary_bus.h", SHIM_HEADER);

    let report = detect(&target.opts()).unwrap();
    assert_eq!(report.classification, Classification::OotRequired);
}

#[test]
fn upstream_header_is_builtin() {
    let target = Target::new();
    let build = target.module_build();
    // Split build/source layout with no generated config
    target.write(
        &format!("{}/source/include/linux/auxiliary_bus.h", build),
        UPSTREAM_HEADER,
    );

    let opts = ProbeOpts {
        ksrc: Some(target.path(&build)),
        ..target.opts()
    };
    let report = detect(&opts).unwrap();
    assert_eq!(report.classification, Classification::Builtin);
}

#[test]
fn nothing_found() {
    let target = Target::new();
    target.write("/usr/src/README", "");

    let result = detect(&target.opts());
    assert!(matches!(result, Err(DetectError::SourceNotFound { .. })));
    assert_eq!(Classification::from_result(&result).exit_code(), 3);
}

#[test]
fn explicit_source_without_headers() {
    let target = Target::new();
    target.write("/opt/empty/Makefile", "");

    let opts = ProbeOpts {
        ksrc: Some(target.path("/opt/empty")),
        ..target.opts()
    };
    let result = detect(&opts);
    assert!(matches!(result, Err(DetectError::HeadersMissing(_))));
}

#[test]
fn cli_exit_codes() {
    let target = Target::new();
    target.autoconf("#define CONFIG_AUXILIARY_BUS 1\n");
    let root = target.root.path().to_str().unwrap();

    assert_eq!(run_cli(&["--root", root, "--build-kernel", RELEASE]), 0);
    assert_eq!(
        run_cli(&["--root", root, "--build-kernel", RELEASE, "--config-key", "CONFIG_DIM"]),
        2
    );
    assert_eq!(run_cli(&["--root", root, "--build-kernel", "0.0.0-missing"]), 3);
}

#[test]
fn cli_json_report() {
    let target = Target::new();
    target.autoconf("#define CONFIG_AUXILIARY_BUS 0\n");
    let root = target.root.path().to_str().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_kshim-probe"))
        .args(["--root", root, "--build-kernel", RELEASE, "--format", "json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["classification"], "misconfigured");
    assert_eq!(report["release"], RELEASE);
    assert_eq!(report["evidence"]["kind"], "config");
    assert_eq!(report["evidence"]["value"], "0");
    assert_eq!(report["capability"]["config_key"], "CONFIG_AUXILIARY_BUS");
    assert_eq!(report["capability"]["marker"], "_AUXILIARY_COMPAT_H_");
}

#[test]
fn cli_empty_ksrc_is_unset() {
    let target = Target::new();
    target.autoconf("#define CONFIG_AUXILIARY_BUS 1\n");
    let root = target.root.path().to_str().unwrap();
    let args = ["--root", root, "--build-kernel", RELEASE];

    assert_eq!(exit_code(cli(&args).env("KSRC", "")), 0);

    let mut with_flag = args.to_vec();
    with_flag.push("--ksrc=");
    assert_eq!(run_cli(&with_flag), 0);
}

#[test]
fn cli_empty_build_kernel_is_unset() {
    let target = Target::new();
    target.headers("/usr/src/linux");
    let root = target.root.path().to_str().unwrap();

    // Falls back to the running kernel, found through the release-independent candidate
    assert_eq!(exit_code(cli(&["--root", root]).env("BUILD_KERNEL", "")), 2);
}

#[test]
fn cli_bad_arguments_are_not_a_classification() {
    let cases: [&[&str]; 4] = [
        &["--bogus"],
        &["--format", "yaml"],
        &["--build-kernel"],
        &["stray-positional"],
    ];
    for args in cases {
        let code = run_cli(args);
        assert_eq!(code, Classification::NotFound.exit_code() as i32, "{:?}", args);
        assert_ne!(code, Classification::OotRequired.exit_code() as i32);
    }
}

#[test]
fn cli_help_and_version_succeed() {
    assert_eq!(run_cli(&["--help"]), 0);
    assert_eq!(run_cli(&["--version"]), 0);
}

#[test]
fn cli_is_quiet_on_success() {
    let target = Target::new();
    target.autoconf("#define CONFIG_AUXILIARY_BUS 1\n");
    let root = target.root.path().to_str().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_kshim-probe"))
        .args(["--root", root, "--build-kernel", RELEASE])
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());
}

#[test]
fn report_paths_stay_inside_root() {
    let target = Target::new();
    target.autoconf("CONFIG_AUXILIARY_BUS=y\n");

    let report = detect(&target.opts()).unwrap();
    assert!(report.source.starts_with(target.root.path()));
    assert!(report.source.ends_with(target.module_build().trim_start_matches('/')));
}
