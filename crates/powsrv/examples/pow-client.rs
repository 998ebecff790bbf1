//! Query a running powsrv and ask it for one nonce.
//!
//! Run with:
//!   cargo run -- serve --endpoint /tmp/powSrv.sock
//!
//! In another terminal:
//!   cargo run --example pow-client -- /tmp/powSrv.sock 9

use std::time::Instant;

use powsrv::client::PowClient;
use powsrv::frame::TRYTE_ALPHABET;
use powsrv::transport::Endpoint;

const TRANSACTION_TRYTES: usize = 2673;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let endpoint: Endpoint = args
        .next()
        .unwrap_or_else(|| Endpoint::DEFAULT_UNIX_PATH.to_string())
        .parse()?;
    let mwm: u8 = args.next().as_deref().unwrap_or("9").parse()?;

    let client = PowClient::connect(&endpoint)?;
    let info = client.get_pow_info()?;
    eprintln!(
        "Connected to {endpoint}: powsrv {} ({} {})",
        info.server_version, info.pow_type, info.pow_version
    );

    let transaction: String = (0..TRANSACTION_TRYTES)
        .map(|i| char::from(TRYTE_ALPHABET[(i * 11) % 27]))
        .collect();

    let started = Instant::now();
    let nonce = client.pow_func(&transaction, mwm)?;
    eprintln!("mwm {mwm} solved in {:?}", started.elapsed());
    println!("{nonce}");
    Ok(())
}
