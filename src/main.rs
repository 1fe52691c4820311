use notebook_lib::server_config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    notebook_lib::init_logging();
    let config = ServerConfig::from_env_and_file()?;
    if let Err(e) = notebook_lib::run(config).await {
        tracing::error!("❌ 服务器启动失败: {:#}", e);
        return Err(e);
    }
    Ok(())
}
