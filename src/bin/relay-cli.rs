use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use file_relay::proxy::filename::decode_header_filename;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Command-line client for the file relay service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a remote file through the relay and save it locally
    Fetch {
        /// Absolute URL of the remote file
        file_url: String,
        /// Directory to write into
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// List stored files
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete a stored file
    Delete { filename: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Fetch { file_url, out } => {
            let res = client
                .post(format!("{}/api/stream", cli.url))
                .json(&json!({ "fileUrl": file_url }))
                .send()
                .await?;
            save_stream(res, out).await?;
        }
        Commands::List { page, limit } => {
            let res = client
                .get(format!("{}/api/list", cli.url))
                .query(&[("page", page), ("limit", limit)])
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Delete { filename } => {
            let res = client
                .delete(format!("{}/api/delete", cli.url))
                .query(&[("filename", filename)])
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn save_stream(mut res: reqwest::Response, out: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        return print_response(res).await;
    }

    let filename = res
        .headers()
        .get("x-filename")
        .and_then(|v| v.to_str().ok())
        .map(decode_header_filename)
        .unwrap_or_else(|| file_relay::proxy::filename::DEFAULT_FILENAME.to_string());
    let expected: u64 = res
        .headers()
        .get("x-filesize")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let path = out.join(&filename);
    let partial = out.join(format!(".{filename}.part"));
    let mut file = File::create(&partial).await?;
    let mut written: u64 = 0;

    loop {
        match res.chunk().await {
            Ok(Some(chunk)) => {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            Ok(None) => break,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                eprintln!("Error: transfer interrupted after {} bytes: {}", written, e);
                return Err(e.into());
            }
        }
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, &path).await?;

    if expected > 0 && expected != written {
        eprintln!("Warning: expected {} bytes, received {}", expected, written);
    }
    println!("Saved {} ({} bytes)", path.display(), written);
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or(text);

    if status.is_success() {
        println!("{}", pretty);
    } else {
        eprintln!("Error: relay returned status {}", status);
        eprintln!("Response: {}", pretty);
    }
    Ok(())
}
