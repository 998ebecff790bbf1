use std::time::{Duration, Instant};

use powsrv_client::ClientConfig;
use powsrv_frame::PowRequest;
use serde::Serialize;

use crate::cmd::{connect_with_timeout, parse_endpoint, parse_timeout, PowArgs};
use crate::exit::{client_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_record, OutputFormat};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct PowOutput {
    endpoint: String,
    min_weight_magnitude: u8,
    nonce: String,
    elapsed_ms: u128,
}

pub fn run(args: PowArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let timeout = parse_timeout(&args.timeout)?;
    let trytes = read_trytes(&args)?;
    PowRequest::new(trytes.as_str(), args.mwm)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid pow request: {err}")))?;
    let config = ClientConfig {
        pow_timeout: timeout,
        ..ClientConfig::default()
    };

    let client = connect_with_timeout(&endpoint, config, CONNECT_TIMEOUT.min(timeout))?;
    let started = Instant::now();
    let nonce = client
        .pow_func(&trytes, args.mwm)
        .map_err(|err| client_error("pow failed", err))?;

    let out = PowOutput {
        endpoint: endpoint.to_string(),
        min_weight_magnitude: args.mwm,
        nonce,
        elapsed_ms: started.elapsed().as_millis(),
    };
    let fields = [
        ("Endpoint", out.endpoint.clone()),
        ("MWM", out.min_weight_magnitude.to_string()),
        ("Nonce", out.nonce.clone()),
        ("Elapsed", format!("{}ms", out.elapsed_ms)),
    ];
    print_record(&out, &fields, &out.nonce, format);
    Ok(SUCCESS)
}

fn read_trytes(args: &PowArgs) -> CliResult<String> {
    let text = match (&args.trytes, &args.file) {
        (Some(trytes), _) => trytes.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?,
        (None, None) => {
            return Err(CliError::new(USAGE, "one of --trytes or --file is required"));
        }
    };
    Ok(text.trim().to_string())
}
