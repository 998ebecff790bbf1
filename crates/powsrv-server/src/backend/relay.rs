use std::time::Duration;

use powsrv_client::{ClientConfig, ClientError, PowClient};
use powsrv_transport::Endpoint;
use tracing::info;

use crate::device::PowDevice;
use crate::error::DeviceError;

/// Forwards PoW work to an upstream powsrv.
///
/// The upstream connection is re-established on the next call after it
/// drops.
pub struct RelayDevice {
    upstream: Endpoint,
    config: ClientConfig,
    client: Option<PowClient>,
    upstream_type: String,
    upstream_version: String,
}

impl RelayDevice {
    /// Connect to `upstream` and record its PoW type and version.
    pub fn connect(upstream: Endpoint, timeout: Duration) -> Result<Self, DeviceError> {
        let config = ClientConfig {
            pow_timeout: timeout,
            ..ClientConfig::default()
        };
        let client =
            PowClient::connect_with_config(&upstream, config.clone()).map_err(unavailable)?;
        let info = client.get_pow_info().map_err(unavailable)?;
        info!(
            %upstream,
            pow_type = %info.pow_type,
            server_version = %info.server_version,
            "relay connected"
        );

        Ok(Self {
            upstream,
            config,
            client: Some(client),
            upstream_type: info.pow_type,
            upstream_version: info.pow_version,
        })
    }

    /// Upstream endpoint.
    pub fn upstream(&self) -> &Endpoint {
        &self.upstream
    }

    fn client(&mut self) -> Result<&PowClient, DeviceError> {
        if let Some(client) = self.client.take().filter(|client| !client.is_closed()) {
            return Ok(self.client.insert(client));
        }
        info!(upstream = %self.upstream, "reconnecting relay");
        let client = PowClient::connect_with_config(&self.upstream, self.config.clone())
            .map_err(unavailable)?;
        Ok(self.client.insert(client))
    }
}

impl PowDevice for RelayDevice {
    fn compute(&mut self, trytes: &str, min_weight_magnitude: u8) -> Result<String, DeviceError> {
        self.client()?
            .pow_func(trytes, min_weight_magnitude)
            .map_err(|err| match err {
                ClientError::Remote(message) => DeviceError::Compute(message),
                ClientError::Disconnected(_) | ClientError::Transport(_) => unavailable(err),
                other => DeviceError::Compute(other.to_string()),
            })
    }

    fn init(&mut self) -> Result<(), DeviceError> {
        self.client()?
            .init_pow()
            .map_err(|err| DeviceError::Init(err.to_string()))
    }

    fn pow_type(&self) -> String {
        format!("relay({})", self.upstream_type)
    }

    fn pow_version(&self) -> String {
        self.upstream_version.clone()
    }
}

fn unavailable(err: ClientError) -> DeviceError {
    DeviceError::Unavailable(err.to_string())
}
