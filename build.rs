fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().compile(&["proto/control_plane.proto"], &["proto"])?;
    Ok(())
}
