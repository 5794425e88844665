//! Build script linking the reflective loader library
//!
//! Windows targets link `reflective_ldr` statically. Its directory is taken
//! from `REFLECTIVE_LDR_LIB_DIR` at build time; otherwise the default linker
//! search path is used.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=REFLECTIVE_LDR_LIB_DIR");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    if let Ok(dir) = env::var("REFLECTIVE_LDR_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }
    println!("cargo:rustc-link-lib=static=reflective_ldr");
}
