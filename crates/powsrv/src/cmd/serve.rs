use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use powsrv_server::{
    build_device, DeviceDispatcher, PowDevice, PowServer, ServerContext, ServerInfo,
};
use tracing::info;

use crate::cmd::ServeArgs;
use crate::config::Config;
use crate::exit::{config_error, server_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let mut config = Config::load_or_default(args.config.as_deref())
        .map_err(|err| config_error("config load failed", err))?;
    config
        .apply(&args.overrides())
        .map_err(|err| config_error("invalid arguments", err))?;
    config
        .validate()
        .map_err(|err| config_error("invalid configuration", err))?;

    let endpoint = config
        .endpoint()
        .map_err(|err| config_error("invalid configuration", err))?;
    let specs = config
        .device_specs()
        .map_err(|err| config_error("invalid configuration", err))?;

    let mut devices: Vec<Box<dyn PowDevice>> = Vec::with_capacity(specs.len());
    for spec in &specs {
        let device = build_device(spec)
            .map_err(|err| server_error("device setup failed", err.into()))?;
        devices.push(device);
    }

    let dispatcher = DeviceDispatcher::new(devices, config.selection_policy())
        .map_err(|err| server_error("device setup failed", err))?;
    for (index, (spec, (pow_type, pow_version))) in
        specs.iter().zip(dispatcher.describe()).enumerate()
    {
        info!(device = index, kind = spec.kind(), %pow_type, %pow_version, "device ready");
    }
    info!(policy = ?dispatcher.policy(), devices = dispatcher.len(), "dispatcher ready");
    let server_info = ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        max_min_weight_magnitude: config.pow.max_min_weight_magnitude,
    };

    let server = PowServer::bind(&endpoint, ServerContext::new(server_info, dispatcher))
        .map_err(|err| server_error("bind failed", err))?;
    install_ctrlc_handler(server.running_flag())?;

    server
        .serve()
        .map_err(|err| server_error("server failed", err))?;
    info!("powsrv stopped");
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
