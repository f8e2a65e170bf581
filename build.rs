//! Build script for the oidc-launch crate.
//!
//! Loads the client configuration at compile time so that
//! `ClientConfig::from_env()` can read it through `option_env!()`.
//!
//! Priority order:
//! 1. Environment variables already set (CI, shell)
//! 2. Variables from `.env` next to `Cargo.toml`
//! 3. Variables from `.env.example` (fallback when nothing else is set)

use std::env;
use std::fs;
use std::path::PathBuf;

const REQUIRED_VARS: [&str; 4] = [
    "OIDC_CLIENT_ID",
    "OIDC_SCOPES",
    "OIDC_REDIRECT_URI",
    "OIDC_API_HOST",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-changed=.env.example");
    for var in REQUIRED_VARS {
        println!("cargo:rerun-if-env-changed={var}");
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let env_file = manifest_dir.join(".env");
    let env_example_file = manifest_dir.join(".env.example");

    let env_vars_set = REQUIRED_VARS
        .iter()
        .filter(|&var| env::var(var).is_ok())
        .count();

    let file_to_load = if env_file.exists() {
        Some(env_file)
    } else if env_vars_set == 0 && env_example_file.exists() {
        Some(env_example_file)
    } else {
        None
    };

    let Some(file_path) = file_to_load else {
        return;
    };

    let Ok(contents) = fs::read_to_string(&file_path) else {
        println!(
            "cargo:warning=Could not read {}, skipping compile-time OIDC configuration",
            file_path.display()
        );
        return;
    };

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');

            // Environment wins over the file
            if env::var(key).is_err() {
                println!("cargo:rustc-env={key}={value}");
            }
        }
    }
}
