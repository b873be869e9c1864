use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    let config = cbindgen::Config::from_file("cbindgen.toml").unwrap_or_default();

    if let Ok(b) = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        b.write_to_file(PathBuf::from(crate_dir).join("include/packzip.h"));
    } else {
        println!("cargo:warning=packzip.h not updated");
    }
}
