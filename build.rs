fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Vendored protoc so the build needs nothing installed.
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    tonic_build::configure()
        .bytes(["."])
        .compile_protos(&["proto/fastls.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/fastls.proto");
    Ok(())
}
