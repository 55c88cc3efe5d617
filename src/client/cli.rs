use anyhow::{bail, Context, Result};
use gas_feed::models::{ApiResponse, NetworkState, PriceState, Simulation};
use reqwest::Client;
use serde::de::DeserializeOwned;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let base_url = std::env::var("GAS_FEED_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let amount: f64 = match std::env::args().nth(1) {
        Some(raw) => raw.parse().with_context(|| format!("Invalid amount: {}", raw))?,
        None => 0.1,
    };

    let client = Client::new();

    println!("Gas Feed Client");
    println!("===============");
    println!("Server: {}", base_url);
    println!();

    let price: PriceState = fetch(&client, &base_url, "/api/price").await?;
    match price.last_updated {
        Some(at) => println!("Base asset: ${:.2} (updated {})", price.usd_per_base_asset, at),
        None => println!("Base asset: ${:.2} (default, no oracle update yet)", price.usd_per_base_asset),
    }
    println!();

    let networks: Vec<NetworkState> = fetch(&client, &base_url, "/api/networks").await?;
    for state in &networks {
        match &state.latest {
            Some(sample) => println!(
                "{:<10} {:<12} block {:<10} {:>10.3} gwei ({} samples)",
                state.network.as_str(),
                format!("{:?}", state.status),
                sample.block_number,
                sample.effective_gas_price_gwei(),
                state.history.len()
            ),
            None => println!(
                "{:<10} {:<12} no samples yet",
                state.network.as_str(),
                format!("{:?}", state.status)
            ),
        }
    }
    println!();

    let simulation: Simulation = fetch(&client, &base_url, &format!("/api/simulate?amount={}", amount)).await?;
    println!("Transfer of {} at ${:.2}:", simulation.transfer_amount, simulation.price_usd);
    for cost in &simulation.costs {
        let marker = if simulation.cheapest.as_ref() == Some(&cost.network) { " <- cheapest" } else { "" };
        println!(
            "  {:<10} gas ${:>10.4}  total ${:>12.4}{}",
            cost.network.as_str(),
            cost.gas_cost_usd,
            cost.total_cost_usd,
            marker
        );
    }
    if simulation.costs.is_empty() {
        println!("  no network has produced a sample yet");
    }

    Ok(())
}

async fn fetch<T: DeserializeOwned>(client: &Client, base_url: &str, endpoint: &str) -> Result<T> {
    let url = format!("{}{}", base_url, endpoint);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await?;
        bail!("{} returned {}: {}", endpoint, status, error_text);
    }

    let body: ApiResponse<T> = response.json().await?;
    Ok(body.data)
}
