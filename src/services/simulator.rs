use crate::{
    models::{GasSample, NetworkCost, NetworkId, Simulation},
    services::normalize::STANDARD_TRANSFER_GAS,
};

pub const DEFAULT_BASE_ASSET_DECIMALS: u32 = 18;

pub fn gas_cost_usd(sample: &GasSample, price_usd: f64, decimals: u32) -> f64 {
    let fee_per_gas = sample.base_fee.saturating_add(sample.priority_fee) as f64;
    let native = fee_per_gas * STANDARD_TRANSFER_GAS as f64 / 10f64.powi(decimals as i32);
    native * price_usd
}

pub fn total_cost_usd(sample: &GasSample, price_usd: f64, transfer_amount: f64, decimals: u32) -> f64 {
    gas_cost_usd(sample, price_usd, decimals) + transfer_amount * price_usd
}

// ties go to the earliest entry
pub fn cheapest_network<'a, I>(samples: I, price_usd: f64, decimals: u32) -> Option<NetworkId>
where
    I: IntoIterator<Item = (&'a NetworkId, &'a GasSample)>,
{
    lowest_cost(
        samples
            .into_iter()
            .map(|(network, sample)| (network, gas_cost_usd(sample, price_usd, decimals))),
    )
}

fn lowest_cost<'a>(costs: impl IntoIterator<Item = (&'a NetworkId, f64)>) -> Option<NetworkId> {
    let mut cheapest: Option<(&NetworkId, f64)> = None;
    for (network, cost) in costs {
        match cheapest {
            Some((_, lowest)) if cost >= lowest => {}
            _ => cheapest = Some((network, cost)),
        }
    }
    cheapest.map(|(network, _)| network.clone())
}

pub fn simulate(samples: &[(NetworkId, GasSample, u32)], price_usd: f64, transfer_amount: f64) -> Simulation {
    let costs: Vec<NetworkCost> = samples
        .iter()
        .map(|(network, sample, decimals)| NetworkCost {
            network: network.clone(),
            block_number: sample.block_number,
            gas_cost_usd: gas_cost_usd(sample, price_usd, *decimals),
            total_cost_usd: total_cost_usd(sample, price_usd, transfer_amount, *decimals),
        })
        .collect();

    let cheapest = lowest_cost(costs.iter().map(|c| (&c.network, c.gas_cost_usd)));

    Simulation {
        transfer_amount,
        price_usd,
        cheapest,
        costs,
    }
}
