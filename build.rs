use std::process::Command;

fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let git_hash = command_output("git", &["rev-parse", "--short", "HEAD"]);
    let build_time = chrono::Utc::now().to_rfc3339();
    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = command_output(&rustc, &["--version"]);

    println!("cargo:rustc-env=DBABSTRACT_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=DBABSTRACT_BUILD_TIME_UTC={}", build_time);
    println!("cargo:rustc-env=DBABSTRACT_RUSTC_VERSION={}", rustc_version);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
