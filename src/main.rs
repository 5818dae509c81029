fn main() -> anyhow::Result<()> {
    tribunal::run()?;
    Ok(())
}
