//! Packaging checks on Cargo.toml: the binary name the CLI tests and the
//! docs rely on, and a release profile tuned for a small single binary.

const CARGO_TOML: &str = include_str!("../Cargo.toml");

/// Lines of the `[name]` section, without comments or blanks.
fn section(name: &str) -> Vec<&'static str> {
    let header = format!("[{}]", name);
    CARGO_TOML
        .lines()
        .map(str::trim)
        .skip_while(|line| *line != header)
        .skip(1)
        .take_while(|line| !line.starts_with('['))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

#[test]
fn package_builds_the_pipewright_binary() {
    let package = section("package");
    assert!(
        package.contains(&r#"name = "pipewright""#),
        "package must be named pipewright so the binary is `pipewright`"
    );
    assert!(
        !CARGO_TOML.contains("[[bin]]"),
        "the binary name comes from the package; a [[bin]] override would rename it"
    );
    assert_eq!(env!("CARGO_PKG_NAME"), "pipewright");
}

#[test]
fn release_profile_is_size_optimised() {
    let release = section("profile.release");
    assert!(!release.is_empty(), "Cargo.toml must have a [profile.release] section");
    for setting in [
        "lto = true",
        "strip = true",
        "codegen-units = 1",
        r#"opt-level = "z""#,
    ] {
        assert!(
            release.contains(&setting),
            "[profile.release] is missing `{}`",
            setting
        );
    }
}
