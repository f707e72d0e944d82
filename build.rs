use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=src");

    // Delete log file if it exists
    if Path::new("haggle.log").exists() {
        fs::remove_file("haggle.log").expect("Failed to delete log file");
        println!("cargo:warning=Deleted haggle.log");
    }
}
