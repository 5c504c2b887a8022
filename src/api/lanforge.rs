/// HTTP/JSON client for the LANforge device controller
///
/// Reads station port state and drives attenuators through the controller's
/// JSON API. `ureq` is blocking, so every request runs on tokio's blocking pool.
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::{
    api::traits::{AttenuatorInfo, DeviceController, MonitorSpec, PortState},
    core::{
        task_manager::run_blocking,
        types::{AttenuatorId, StationId},
    },
};

#[derive(Clone)]
pub struct LanforgeClient {
    agent: ureq::Agent,
    base: Url,
}

impl LanforgeClient {
    /// Create a client for a controller base URL such as `http://localhost:8080`.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("invalid controller URL '{base_url}'"))?;
        if base.cannot_be_a_base() {
            bail!("controller URL '{base_url}' cannot be used as a base");
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            agent: ureq::Agent::new_with_defaults(),
            base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("cannot join '{path}' onto {}", self.base))
    }

    pub(crate) fn port_url(&self, station: &StationId) -> Result<Url> {
        let (shelf, resource, port) = station.parts()?;
        let mut url = self.endpoint(&format!("port/{shelf}/{resource}/{port}"))?;
        url.set_query(Some("fields=ap,signal"));
        Ok(url)
    }
}

fn get_json(agent: &ureq::Agent, url: &Url) -> Result<Option<Value>> {
    match agent.get(url.as_str()).call() {
        Ok(mut response) => {
            let value = response
                .body_mut()
                .read_json::<Value>()
                .with_context(|| format!("malformed JSON from {url}"))?;
            Ok(Some(value))
        }
        Err(ureq::Error::StatusCode(404)) => Ok(None),
        Err(err) => Err(anyhow!("GET {url} failed: {err}")),
    }
}

fn post_json(agent: &ureq::Agent, url: &Url, body: &Value) -> Result<()> {
    agent
        .post(url.as_str())
        .send_json(body)
        .map_err(|err| anyhow!("POST {url} failed: {err}"))?;
    Ok(())
}

/// `set_port` interest bits for the admin-down flag and current flags.
const MONITOR_UP_INTEREST: u32 = 0x0080_0002;

/// The `cli-json` commands that rebuild a monitor port, in order.
pub fn monitor_requests(monitor: &MonitorSpec) -> Result<Vec<(&'static str, Value)>> {
    let (shelf, resource, radio) = monitor.radio.parts()?;
    let mut requests = vec![(
        "cli-json/rm_vlan",
        json!({ "shelf": shelf, "resource": resource, "port": monitor.name }),
    )];

    let pin_channel = !monitor.channel.eq_ignore_ascii_case("auto");
    if pin_channel || monitor.frequency.is_some() {
        let mut radio_cfg = json!({
            "shelf": shelf,
            "resource": resource,
            "radio": radio,
            "mode": "NA",
        });
        if pin_channel {
            radio_cfg["channel"] = json!(monitor.channel);
        }
        if let Some(frequency) = monitor.frequency {
            radio_cfg["frequency"] = json!(frequency);
        }
        requests.push(("cli-json/set_wifi_radio", radio_cfg));
    }

    requests.push((
        "cli-json/add_monitor",
        json!({
            "shelf": shelf,
            "resource": resource,
            "radio": radio,
            "ap_name": monitor.name,
            "flags": 0,
            "flags_mask": 0xFFFF,
        }),
    ));
    requests.push((
        "cli-json/set_port",
        json!({
            "shelf": shelf,
            "resource": resource,
            "port": monitor.name,
            "current_flags": 0,
            "interest": MONITOR_UP_INTEREST,
        }),
    ));
    Ok(requests)
}

/// Extract `ap` and `signal` from a `/port` response.
pub fn parse_port_state(value: &Value) -> Option<PortState> {
    let interface = value.get("interface")?;
    if interface.is_null() {
        return None;
    }

    let ap = interface
        .get("ap")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let signal = interface.get("signal").and_then(parse_signal);
    Some(PortState { ap, signal })
}

/// The controller reports signal either as a number or as text like `-42 dBm`.
pub fn parse_signal(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.split_whitespace().next()?.parse().ok(),
        _ => None,
    }
}

/// Flatten both shapes of the `/atten/list` response.
pub fn parse_attenuator_list(value: &Value) -> Vec<AttenuatorInfo> {
    let entries: Vec<&Value> = match (value.get("attenuators"), value.get("attenuator")) {
        (Some(Value::Array(items)), _) => items.iter().collect(),
        (_, Some(single)) => vec![single],
        _ => Vec::new(),
    };

    let mut out = Vec::new();
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };

        if let Some(serial) = obj.get("entity id").and_then(Value::as_str) {
            out.push(AttenuatorInfo {
                serial: AttenuatorId::new(serial),
                state: state_of(entry),
            });
            continue;
        }

        for (serial, details) in obj {
            out.push(AttenuatorInfo {
                serial: AttenuatorId::new(serial.as_str()),
                state: state_of(details),
            });
        }
    }
    out
}

fn state_of(details: &Value) -> String {
    details
        .get("state")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl DeviceController for LanforgeClient {
    async fn port_state(&self, station: &StationId) -> Result<Option<PortState>> {
        let url = self.port_url(station)?;
        let agent = self.agent.clone();
        let value = run_blocking(move || get_json(&agent, &url)).await?;
        Ok(value.as_ref().and_then(parse_port_state))
    }

    async fn set_attenuation(&self, serial: &AttenuatorId, value: u32) -> Result<()> {
        let url = self.endpoint("cli-json/set_attenuator")?;
        let (shelf, resource, serno) = serial.parts();
        let body = json!({
            "shelf": shelf,
            "resource": resource,
            "serno": serno,
            "atten_idx": "all",
            "val": value,
        });
        let agent = self.agent.clone();
        run_blocking(move || post_json(&agent, &url, &body)).await
    }

    async fn list_attenuators(&self) -> Result<Vec<AttenuatorInfo>> {
        let url = self.endpoint("atten/list")?;
        let agent = self.agent.clone();
        let value = run_blocking(move || get_json(&agent, &url)).await?;
        Ok(value.as_ref().map(parse_attenuator_list).unwrap_or_default())
    }

    async fn create_monitor(&self, monitor: &MonitorSpec) -> Result<()> {
        let requests = monitor_requests(monitor)?
            .into_iter()
            .map(|(path, body)| self.endpoint(path).map(|url| (url, body)))
            .collect::<Result<Vec<_>>>()?;
        let agent = self.agent.clone();
        run_blocking(move || {
            for (url, body) in &requests {
                post_json(&agent, url, body)?;
            }
            Ok(())
        })
        .await?;
        log::info!("Created monitor {} on {}", monitor.name, monitor.radio);
        Ok(())
    }
}
