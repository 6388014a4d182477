use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use tunnel_relay::{Request, Response, TunnelClient};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Send requests to a tunnel relay", long_about = None)]
struct Cli {
    /// Tunnel address of the relay.
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    tunnel: String,

    /// HTTP base URL of the relay.
    #[arg(short = 'u', long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Largest frame to send or accept.
    #[arg(long, default_value_t = 1024 * 1024)]
    max_frame_bytes: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request over a tunnel session
    Tunnel(RequestArgs),
    /// Send one request over plain HTTP
    Http(RequestArgs),
}

#[derive(clap::Args)]
struct RequestArgs {
    /// Request path
    #[arg(default_value = "/")]
    path: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Header as name=value (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Request body
    #[arg(short, long)]
    body: Option<String>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got {:?}", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tunnel(args) => {
            let mut request = Request::new(args.path).with_method(&args.method);
            for (name, value) in args.headers {
                request = request.with_header(name, value);
            }
            if let Some(body) = args.body {
                request = request.with_body(body);
            }

            let client = TunnelClient::connect(&cli.tunnel, cli.max_frame_bytes).await?;
            let response = client.send(request).await?;
            client.close().await?;
            print_tunnel_response(&response)?;
        }
        Commands::Http(args) => {
            let mut headers = HeaderMap::new();
            for (name, value) in &args.headers {
                headers.insert(
                    HeaderName::from_bytes(name.as_bytes())?,
                    HeaderValue::from_str(value)?,
                );
            }

            let method = reqwest::Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())?;
            let res = reqwest::Client::new()
                .request(method, format!("{}{}", cli.url.trim_end_matches('/'), args.path))
                .headers(headers)
                .body(args.body.unwrap_or_default())
                .send()
                .await?;
            print_http_response(res).await?;
        }
    }

    Ok(())
}

fn print_tunnel_response(response: &Response) -> Result<(), Box<dyn std::error::Error>> {
    println!("status: {}", response.status);
    if !response.body.is_empty() {
        println!("{}", serde_json::to_string_pretty(&response.body)?);
    }
    Ok(())
}

async fn print_http_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    println!("status: {}", res.status().as_u16());

    let text = res.text().await?;
    if text.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
