//! `switchboard server` - Start the Switchboard HTTP backend server.

pub async fn run(host: String, port: u16, db_path: String, jwt_secret: String) -> Result<(), String> {
    let config = switchboard_server::ServerConfig {
        host: host.clone(),
        port,
        db_path,
        jwt_secret,
        ..switchboard_server::ServerConfig::default()
    };

    println!("Starting Switchboard server on {}:{}...", host, port);

    let addr = switchboard_server::start_server(config).await?;
    println!("Switchboard server listening on http://{}", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
