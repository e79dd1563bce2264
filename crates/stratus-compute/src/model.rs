//! Wire views over virtual machine and template payloads
//!
//! These are deliberately thin: only the fields the workflows consume.
//! Mapping to rich domain objects is the caller's concern.

use crate::error::{ComputeError, Result};
use serde::Deserialize;

/// Power state as reported in the `PowerState` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Stopped,
    Running,
    Suspended,
    Unknown,
}

/// Guest OS family, derived from template metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Linux,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Windows => "Windows",
            OsFamily::Linux => "Linux",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NicRecord {
    #[serde(rename = "NetworkID")]
    pub network_id: Option<String>,
    #[serde(rename = "VirtualMachineNicID")]
    pub nic_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiskRecord {
    #[serde(rename = "VirtualMachineDiskID")]
    pub disk_id: Option<String>,
    #[serde(rename = "DeviceKey")]
    pub device_key: Option<i64>,
    #[serde(rename = "CapacityKB")]
    pub capacity_kb: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SiteRecord {
    #[serde(rename = "SiteID")]
    site_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HypervisorRecord {
    #[serde(rename = "Site")]
    site: Option<SiteRecord>,
}

/// A VM or template as the service reports it. Templates share the
/// `/VirtualMachine` endpoint and are distinguished by `IsTemplate`.
#[derive(Debug, Clone, Deserialize)]
pub struct VmRecord {
    #[serde(rename = "VirtualMachineID")]
    pub id: String,
    #[serde(rename = "CustomerDefinedName")]
    pub name: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "IsTemplate", default)]
    pub is_template: bool,
    #[serde(rename = "IsRemoved", default)]
    pub is_removed: bool,
    #[serde(rename = "PowerState")]
    power_state: Option<String>,
    #[serde(rename = "NumCpu")]
    pub num_cpu: Option<u32>,
    #[serde(rename = "RamAllocatedMB")]
    pub ram_mb: Option<u64>,
    #[serde(rename = "ResourcePoolID")]
    pub resource_pool_id: Option<String>,
    #[serde(rename = "TenantID")]
    pub tenant_id: Option<String>,
    #[serde(rename = "OS")]
    pub os: Option<String>,
    #[serde(rename = "Nics", default)]
    pub nics: Vec<NicRecord>,
    #[serde(rename = "Disks", default)]
    pub disks: Vec<DiskRecord>,
    #[serde(rename = "Hypervisor")]
    hypervisor: Option<HypervisorRecord>,
}

impl VmRecord {
    pub fn power_state(&self) -> PowerState {
        match self.power_state.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("poweredoff") => PowerState::Stopped,
            Some(s) if s.eq_ignore_ascii_case("poweredon") => PowerState::Running,
            Some(s) if s.eq_ignore_ascii_case("suspended") => PowerState::Suspended,
            other => {
                if let Some(s) = other {
                    tracing::warn!(state = %s, vm = %self.id, "unknown power state");
                }
                PowerState::Unknown
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.power_state() == PowerState::Stopped
    }

    /// Hosting site, used to scope placement queries.
    pub fn site_id(&self) -> Option<&str> {
        self.hypervisor
            .as_ref()
            .and_then(|h| h.site.as_ref())
            .and_then(|s| s.site_id.as_deref())
    }

    /// Id of the first network interface, when one is attached.
    pub fn nic_id(&self) -> Option<&str> {
        self.nics.first().and_then(|n| n.nic_id.as_deref())
    }

    /// Device key of the template's root disk.
    pub fn device_key(&self) -> Result<i64> {
        self.disks
            .first()
            .and_then(|d| d.device_key)
            .ok_or(ComputeError::MissingField("Disks[0].DeviceKey"))
    }

    /// OS family derived from the `OS` field; anything not Windows is
    /// treated as Linux, matching the service's launch contract.
    pub fn os_family(&self) -> OsFamily {
        match &self.os {
            Some(os) if os.to_ascii_lowercase().contains("windows") => OsFamily::Windows,
            _ => OsFamily::Linux,
        }
    }

    /// Current compute product, when the record carries sizing fields.
    pub fn product(&self) -> Option<ComputeProduct> {
        Some(ComputeProduct {
            cpu_count: self.num_cpu?,
            ram_mb: self.ram_mb?,
        })
    }
}

/// CPU/RAM sizing, identified on the wire as `"<ramMb>:<cpuCount>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeProduct {
    pub cpu_count: u32,
    pub ram_mb: u64,
}

impl ComputeProduct {
    pub fn new(ram_mb: u64, cpu_count: u32) -> Self {
        Self { cpu_count, ram_mb }
    }

    /// Parse a `"<ramMb>:<cpuCount>"` product id.
    pub fn parse(product_id: &str) -> Result<Self> {
        let mut parts = product_id.splitn(2, ':');
        let ram = parts.next().unwrap_or_default();
        let cpu = parts
            .next()
            .ok_or_else(|| ComputeError::InvalidProduct(product_id.to_string()))?;
        let ram_mb = ram
            .parse::<u64>()
            .map_err(|_| ComputeError::InvalidProduct(product_id.to_string()))?;
        let cpu_count = cpu
            .parse::<u32>()
            .map_err(|_| ComputeError::InvalidProduct(product_id.to_string()))?;
        Ok(Self { cpu_count, ram_mb })
    }

    pub fn id(&self) -> String {
        format!("{}:{}", self.ram_mb, self.cpu_count)
    }

    /// The cloud's standard sizing grid.
    pub fn standard_catalog() -> Vec<ComputeProduct> {
        let mut products = Vec::new();
        for ram in [1024, 2048, 4096, 8192, 12288, 16384, 20480, 24576, 28668, 32768] {
            for cpu in 1..=8 {
                products.push(ComputeProduct::new(ram, cpu));
            }
        }
        products
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VM_JSON: &str = r#"{
        "VirtualMachineID": "vm-42",
        "CustomerDefinedName": "web-1",
        "IsTemplate": false,
        "IsRemoved": false,
        "PowerState": "PoweredOn",
        "NumCpu": 2,
        "RamAllocatedMB": 4096,
        "ResourcePoolID": "pool-1",
        "TenantID": "tenant-9",
        "OS": "Ubuntu Linux",
        "Nics": [{"NetworkID": "net-1", "VirtualMachineNicID": "nic-7"}],
        "Disks": [{"VirtualMachineDiskID": "disk-3", "DeviceKey": 2000, "CapacityKB": 20971520}],
        "Hypervisor": {"Site": {"SiteID": "site-A"}}
    }"#;

    #[test]
    fn parses_the_fields_workflows_need() {
        let vm: VmRecord = serde_json::from_str(VM_JSON).unwrap();
        assert_eq!(vm.id, "vm-42");
        assert_eq!(vm.power_state(), PowerState::Running);
        assert_eq!(vm.site_id(), Some("site-A"));
        assert_eq!(vm.nic_id(), Some("nic-7"));
        assert_eq!(vm.device_key().unwrap(), 2000);
        assert_eq!(vm.os_family(), OsFamily::Linux);
        assert_eq!(vm.product(), Some(ComputeProduct::new(4096, 2)));
    }

    #[test]
    fn power_state_is_case_insensitive_and_defaults_unknown() {
        let vm: VmRecord =
            serde_json::from_str(r#"{"VirtualMachineID":"v","PowerState":"POWEREDOFF"}"#).unwrap();
        assert_eq!(vm.power_state(), PowerState::Stopped);
        let vm: VmRecord = serde_json::from_str(r#"{"VirtualMachineID":"v"}"#).unwrap();
        assert_eq!(vm.power_state(), PowerState::Unknown);
    }

    #[test]
    fn product_ids_round_trip() {
        let product = ComputeProduct::parse("2048:2").unwrap();
        assert_eq!(product.ram_mb, 2048);
        assert_eq!(product.cpu_count, 2);
        assert_eq!(product.id(), "2048:2");
        assert!(ComputeProduct::parse("2048").is_err());
        assert!(ComputeProduct::parse("big:fast").is_err());
    }

    #[test]
    fn standard_catalog_covers_the_grid() {
        let catalog = ComputeProduct::standard_catalog();
        assert_eq!(catalog.len(), 80);
        assert!(catalog.contains(&ComputeProduct::new(12288, 5)));
    }

    #[test]
    fn windows_detection_from_os_field() {
        let vm: VmRecord = serde_json::from_str(
            r#"{"VirtualMachineID":"v","OS":"Microsoft Windows Server 2012"}"#,
        )
        .unwrap();
        assert_eq!(vm.os_family(), OsFamily::Windows);
    }
}
