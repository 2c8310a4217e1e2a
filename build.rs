use std::{env, error::Error};

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_CRITICAL_SECTION");

    if env::var_os("CARGO_FEATURE_CRITICAL_SECTION").is_some() {
        println!("cargo:rustc-cfg=has_critical_section_impl");
    }

    Ok(())
}
