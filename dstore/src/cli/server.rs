/// Runs the REST server until Ctrl+C or SIGTERM.
pub async fn run() {
    server::run().await;
}
