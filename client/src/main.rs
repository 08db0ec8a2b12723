use clap::Parser;
use client::network::Client;
use client::scene::NullScene;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Starting arena client, connecting to {}", args.server);

    // Headless by default; an embedder with a window swaps in its own Scene
    // and feeds key state through Client::input_mut
    let mut client = Client::new(&args.server, Box::new(NullScene)).await?;
    client.run().await?;

    Ok(())
}
