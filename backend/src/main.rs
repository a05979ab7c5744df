#[tokio::main]
async fn main() -> anyhow::Result<()> {
    survey::start_server().await?;

    Ok(())
}
