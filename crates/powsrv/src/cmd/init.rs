use powsrv_client::ClientConfig;
use serde::Serialize;

use crate::cmd::{connect_with_timeout, parse_endpoint, parse_timeout, InitArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct InitOutput {
    endpoint: String,
    initialized: bool,
}

pub fn run(args: InitArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let timeout = parse_timeout(&args.timeout)?;
    let config = ClientConfig {
        timeout,
        ..ClientConfig::default()
    };

    let client = connect_with_timeout(&endpoint, config, timeout)?;
    client
        .init_pow()
        .map_err(|err| client_error("init failed", err))?;

    let out = InitOutput {
        endpoint: endpoint.to_string(),
        initialized: true,
    };
    let fields = [
        ("Endpoint", out.endpoint.clone()),
        ("Initialized", "yes".to_string()),
    ];
    print_record(&out, &fields, "ok", format);
    Ok(SUCCESS)
}
