#[tokio::main]
async fn main() {
    if let Err(e) = pruner::cli::run_cli().await {
        println!("Error: {e:#}");
        std::process::exit(1);
    }
}
