use powsrv_client::ClientConfig;
use serde::Serialize;

use crate::cmd::{connect_with_timeout, parse_endpoint, parse_timeout, InfoArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    endpoint: String,
    server_version: String,
    pow_type: String,
    pow_version: String,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let timeout = parse_timeout(&args.timeout)?;
    let config = ClientConfig {
        timeout,
        ..ClientConfig::default()
    };

    let client = connect_with_timeout(&endpoint, config, timeout)?;
    let info = client
        .get_pow_info()
        .map_err(|err| client_error("info request failed", err))?;

    let out = InfoOutput {
        endpoint: endpoint.to_string(),
        server_version: info.server_version,
        pow_type: info.pow_type,
        pow_version: info.pow_version,
    };
    let fields = [
        ("Endpoint", out.endpoint.clone()),
        ("Server version", out.server_version.clone()),
        ("PoW type", out.pow_type.clone()),
        ("PoW version", out.pow_version.clone()),
    ];
    print_record(&out, &fields, &out.server_version, format);
    Ok(SUCCESS)
}
