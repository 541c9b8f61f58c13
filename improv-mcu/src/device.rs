//! Static device description reported to hosts

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Placeholder in a device URL template replaced by the local address
pub const LOCAL_IPV4_TOKEN: &str = "{LOCAL_IPV4}";

/// Hardware variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChipFamily {
    #[serde(rename = "ESP32")]
    Esp32,
    #[serde(rename = "ESP32-C3")]
    Esp32C3,
    #[serde(rename = "ESP32-S2")]
    Esp32S2,
    #[serde(rename = "ESP32-S3")]
    Esp32S3,
    #[serde(rename = "ESP8266")]
    Esp8266,
}

impl ChipFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChipFamily::Esp32 => "ESP32",
            ChipFamily::Esp32C3 => "ESP32-C3",
            ChipFamily::Esp32S2 => "ESP32-S2",
            ChipFamily::Esp32S3 => "ESP32-S3",
            ChipFamily::Esp8266 => "ESP8266",
        }
    }
}

/// Device details sent in response to `GetDeviceInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub chip_family: ChipFamily,
    pub firmware_name: String,
    pub firmware_version: String,
    pub device_name: String,
    /// URL template, may contain `{LOCAL_IPV4}`
    #[serde(default)]
    pub device_url: Option<String>,
}

impl DeviceInfo {
    pub fn new(
        chip_family: ChipFamily,
        firmware_name: impl Into<String>,
        firmware_version: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            chip_family,
            firmware_name: firmware_name.into(),
            firmware_version: firmware_version.into(),
            device_name: device_name.into(),
            device_url: None,
        }
    }

    pub fn with_url(mut self, template: impl Into<String>) -> Self {
        self.device_url = Some(template.into());
        self
    }

    /// Fields of the device info response, in wire order
    pub fn rpc_fields(&self) -> [&str; 4] {
        [
            self.firmware_name.as_str(),
            self.firmware_version.as_str(),
            self.chip_family.as_str(),
            self.device_name.as_str(),
        ]
    }

    /// URL where the host can continue onboarding
    ///
    /// Without a template this is `http://<ip>`. An unknown address renders
    /// as `0.0.0.0`.
    pub fn device_url(&self, ip: Option<Ipv4Addr>) -> String {
        let ip = ip.unwrap_or(Ipv4Addr::UNSPECIFIED).to_string();
        match self.device_url.as_deref() {
            None | Some("") => format!("http://{ip}"),
            Some(template) => template.replace(LOCAL_IPV4_TOKEN, &ip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo::new(ChipFamily::Esp32C3, "lamp-fw", "2.1.5", "Desk Lamp")
    }

    #[test]
    fn default_url_uses_ip() {
        assert_eq!(
            info().device_url(Some(Ipv4Addr::new(192, 168, 1, 7))),
            "http://192.168.1.7"
        );
        assert_eq!(info().device_url(None), "http://0.0.0.0");
    }

    #[test]
    fn template_substitutes_every_token() {
        let info = info().with_url("http://{LOCAL_IPV4}/setup?back={LOCAL_IPV4}");
        assert_eq!(
            info.device_url(Some(Ipv4Addr::new(10, 0, 0, 2))),
            "http://10.0.0.2/setup?back=10.0.0.2"
        );
        // the template is not consumed by rendering
        assert_eq!(
            info.device_url(Some(Ipv4Addr::new(10, 0, 0, 3))),
            "http://10.0.0.3/setup?back=10.0.0.3"
        );
    }

    #[test]
    fn rpc_field_order() {
        assert_eq!(info().rpc_fields(), ["lamp-fw", "2.1.5", "ESP32-C3", "Desk Lamp"]);
    }

    #[test]
    fn chip_family_from_json() {
        let info: DeviceInfo = serde_json::from_str(
            r#"{"chip_family":"ESP8266","firmware_name":"a","firmware_version":"b","device_name":"c"}"#,
        )
        .unwrap();
        assert_eq!(info.chip_family, ChipFamily::Esp8266);
        assert_eq!(info.device_url, None);
    }
}
