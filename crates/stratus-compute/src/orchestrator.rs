//! VM lifecycle workflows
//!
//! Every mutating step is a queued server-side task awaited through
//! `stratus_cloud::submit_and_wait`. Workflows fail fast: a step that
//! errors surfaces immediately and earlier steps are not compensated.

use crate::error::{ComputeError, Result};
use crate::model::{ComputeProduct, PowerState, VmRecord};
use crate::placement::{select_pool, select_storage};
use serde_json::json;
use std::time::Duration;
use stratus_cloud::{poll_until, submit_and_wait, CloudError, EngineConfig, Transport};

/// Root disk capacity used when a launch request does not size it, in KB.
pub const DEFAULT_ROOT_DISK_KB: u64 = 20_971_520;

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub template_id: String,
    pub name: String,
    pub description: String,
    /// Product id in `"<ramMb>:<cpuCount>"` form.
    pub product_id: String,
    /// Mandatory on this cloud; launch rejects a request without one.
    pub network_id: Option<String>,
    pub root_disk_kb: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum DiskChange {
    Add { capacity_kb: u64 },
    Resize { disk_id: String, capacity_kb: u64 },
    Remove { disk_id: String },
}

#[derive(Debug, Clone, Default)]
pub struct ResizeRequest {
    pub product: Option<ComputeProduct>,
    pub disk_changes: Vec<DiskChange>,
}

/// Drives the multi-step VM workflows against a [`Transport`].
pub struct Orchestrator<T: Transport> {
    transport: T,
    config: EngineConfig,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(transport: T, config: EngineConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch a VM by id; templates and removed records resolve to `None`.
    pub async fn get_vm(&self, vm_id: &str) -> Result<Option<VmRecord>> {
        let record = fetch_record(&self.transport, vm_id).await?;
        Ok(record.filter(|r| !r.is_template))
    }

    /// Fetch a machine image by id; only `IsTemplate` records qualify.
    pub async fn get_template(&self, template_id: &str) -> Result<Option<VmRecord>> {
        let record = fetch_record(&self.transport, template_id).await?;
        Ok(record.filter(|r| r.is_template))
    }

    async fn require_vm(&self, vm_id: &str) -> Result<VmRecord> {
        self.get_vm(vm_id)
            .await?
            .ok_or_else(|| ComputeError::VmNotFound(vm_id.to_string()))
    }

    pub async fn list_vms(&self) -> Result<Vec<VmRecord>> {
        self.list("/VirtualMachine?$filter=IsRemoved eq false and IsTemplate eq false")
            .await
    }

    pub async fn list_templates(&self) -> Result<Vec<VmRecord>> {
        self.list("/VirtualMachine?$filter=IsRemoved eq false and IsTemplate eq true")
            .await
    }

    async fn list(&self, path: &str) -> Result<Vec<VmRecord>> {
        match self.transport.get(path).await? {
            Some(body) if !body.is_empty() => Ok(serde_json::from_str(&body)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Provision a VM from a template.
    ///
    /// Placement happens up front: the root disk lands on the fullest
    /// qualifying storage bin in the template's site and the VM joins the
    /// site's busiest resource pool. The queued `SetVM` task resolves to
    /// the new VM id.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<VmRecord> {
        let network_id = request.network_id.as_deref().ok_or_else(|| {
            ComputeError::InvalidRequest("a network id is mandatory for launch".to_string())
        })?;
        let template = self
            .get_template(&request.template_id)
            .await?
            .ok_or_else(|| ComputeError::VmNotFound(request.template_id.clone()))?;
        let product = ComputeProduct::parse(&request.product_id)?;
        let device_key = template.device_key()?;
        let site = template
            .site_id()
            .ok_or(ComputeError::MissingField("Hypervisor.Site.SiteID"))?
            .to_string();
        let root_disk_kb = request.root_disk_kb.unwrap_or(DEFAULT_ROOT_DISK_KB);

        let storage_id = select_storage(&self.transport, root_disk_kb, &site).await?;
        let pool_id = select_pool(&self.transport, &site).await?;

        let payload = json!({
            "CustomerDefinedName": request.name,
            "Description": request.description,
            "SourceTemplateID": request.template_id,
            "NumCpu": product.cpu_count,
            "RamAllocatedMB": product.ram_mb,
            "ResourcePoolID": pool_id,
            "OSType": template.os_family().as_str(),
            "Disks": [{
                "DeviceKey": device_key,
                "CapacityKB": root_disk_kb,
                "StorageID": storage_id,
            }],
            "Nics": [{"NetworkID": network_id}],
        });
        tracing::info!(
            template = %request.template_id,
            product = %request.product_id,
            "launching virtual machine"
        );
        let result = submit_and_wait(
            &self.transport,
            &self.config,
            "/VirtualMachine/SetVM",
            &payload.to_string(),
        )
        .await?
        .ok_or(ComputeError::MissingField("SetVM task result"))?;
        let vm_id = unquote(&result);
        self.get_vm(&vm_id)
            .await?
            .ok_or_else(|| ComputeError::NeverMaterialized(format!("vm {vm_id}")))
    }

    /// Change a VM's product and/or disks.
    ///
    /// A request whose product matches the VM's current sizing skips the
    /// power cycle entirely. An actual product change requires the guest
    /// down, so a running VM is powered off first and restarted afterward.
    /// The stop wait here has no deadline: reconfiguring a half-running
    /// guest is never right, so the workflow holds until the service
    /// reports it stopped. Disk changes run afterward, each awaited
    /// independently; adds and grows are placed through [`select_storage`].
    pub async fn resize(&self, vm_id: &str, request: &ResizeRequest) -> Result<VmRecord> {
        let vm = self.require_vm(vm_id).await?;

        match request.product {
            Some(product) if vm.product() == Some(product) => {
                tracing::debug!(%vm_id, product = %product.id(), "product unchanged, nothing to reconfigure");
            }
            Some(product) => {
                let mut restart_owed = false;
                if !vm.is_stopped() {
                    restart_owed = true;
                    tracing::info!(%vm_id, "stopping for reconfigure");
                    self.stop(vm_id, true).await?;
                    self.wait_until_stopped(vm_id, None).await?;
                }
                let payload = json!({
                    "VirtualMachineID": vm_id,
                    "NumCpu": product.cpu_count,
                    "RamAllocatedMB": product.ram_mb,
                    "ResourcePoolID": vm.resource_pool_id,
                });
                submit_and_wait(
                    &self.transport,
                    &self.config,
                    "/VirtualMachine/ReconfigureVM",
                    &payload.to_string(),
                )
                .await?;
                if restart_owed {
                    self.start(vm_id).await?;
                }
            }
            None => {}
        }

        for change in &request.disk_changes {
            match change {
                DiskChange::Add { capacity_kb } => {
                    let site = vm
                        .site_id()
                        .ok_or(ComputeError::MissingField("Hypervisor.Site.SiteID"))?;
                    let storage_id = select_storage(&self.transport, *capacity_kb, site).await?;
                    let payload = json!({
                        "VirtualMachineID": vm_id,
                        "StorageID": storage_id,
                        "CapacityKB": capacity_kb,
                    });
                    submit_and_wait(
                        &self.transport,
                        &self.config,
                        "/VirtualMachine/AddDisk",
                        &payload.to_string(),
                    )
                    .await?;
                }
                DiskChange::Resize {
                    disk_id,
                    capacity_kb,
                } => {
                    let site = vm
                        .site_id()
                        .ok_or(ComputeError::MissingField("Hypervisor.Site.SiteID"))?;
                    let storage_id = select_storage(&self.transport, *capacity_kb, site).await?;
                    let payload = json!({
                        "VirtualMachineID": vm_id,
                        "VirtualMachineDiskID": disk_id,
                        "StorageID": storage_id,
                        "CapacityKB": capacity_kb,
                    });
                    submit_and_wait(
                        &self.transport,
                        &self.config,
                        "/VirtualMachine/ReconfigureDisk",
                        &payload.to_string(),
                    )
                    .await?;
                }
                DiskChange::Remove { disk_id } => {
                    self.remove_disk(vm_id, disk_id).await?;
                }
            }
        }

        self.require_vm(vm_id).await
    }

    /// Detach and delete a disk.
    pub async fn remove_disk(&self, vm_id: &str, disk_id: &str) -> Result<()> {
        let payload = json!({
            "VirtualMachineID": vm_id,
            "VirtualMachineDiskID": disk_id,
        });
        submit_and_wait(
            &self.transport,
            &self.config,
            "/VirtualMachine/RemoveDisk",
            &payload.to_string(),
        )
        .await?;
        tracing::info!(%vm_id, disk_id, "disk removed");
        Ok(())
    }

    /// Remove a VM, forcing it off first.
    ///
    /// The remove call is only reachable once the service has reported the
    /// VM stopped; a guest that outlives `stop_deadline` surfaces as
    /// [`ComputeError::StopDeadlineExceeded`] with nothing removed.
    pub async fn terminate(&self, vm_id: &str) -> Result<()> {
        let vm = self.require_vm(vm_id).await?;
        if !vm.is_stopped() {
            self.stop(vm_id, true).await?;
            let stopped = self
                .wait_until_stopped(vm_id, Some(self.config.stop_deadline))
                .await?;
            if !stopped {
                return Err(ComputeError::StopDeadlineExceeded(vm_id.to_string()));
            }
        }
        let path = format!("/VirtualMachine/{vm_id}/Remove");
        submit_and_wait(&self.transport, &self.config, &path, "").await?;
        tracing::info!(%vm_id, "virtual machine removed");
        Ok(())
    }

    /// Capture a VM into a machine image.
    ///
    /// Clones the VM powered off, strips the clone's nic (images must not
    /// carry network bindings), marks the clone as a template, then waits
    /// up to `image_deadline` for the image to become visible.
    pub async fn capture_image(
        &self,
        vm_id: &str,
        name: &str,
        description: &str,
    ) -> Result<String> {
        self.require_vm(vm_id).await?;

        let clone_payload = json!({
            "VirtualMachineID": vm_id,
            "Name": name,
            "Description": description,
            "PowerOn": false,
        });
        let clone_id = submit_and_wait(
            &self.transport,
            &self.config,
            "/VirtualMachine/CloneVM",
            &clone_payload.to_string(),
        )
        .await?
        .ok_or(ComputeError::MissingField("CloneVM task result"))?;
        let clone_id = unquote(&clone_id);
        tracing::info!(%vm_id, clone = %clone_id, "cloned for capture");

        let clone = self.require_vm(&clone_id).await?;
        if let Some(nic_id) = clone.nic_id() {
            let payload = json!({
                "VirtualMachineID": clone_id,
                "VirtualMachineNicID": nic_id,
            });
            submit_and_wait(
                &self.transport,
                &self.config,
                "/VirtualMachine/RemoveNic",
                &payload.to_string(),
            )
            .await?;
            let refreshed = self.require_vm(&clone_id).await?;
            if refreshed.nic_id().is_some() {
                tracing::warn!(clone = %clone_id, "clone still reports a nic after removal");
            }
        }

        let template_id = submit_and_wait(
            &self.transport,
            &self.config,
            "/VirtualMachine/MarkAsTemplate",
            &clone_id,
        )
        .await?
        .map(|r| unquote(&r))
        .filter(|id| !id.is_empty())
        .ok_or(ComputeError::MissingField("MarkAsTemplate task result"))?;

        let visible = poll_until(
            self.config.poll_interval,
            Some(self.config.image_deadline),
            || probe_template(&self.transport, &template_id),
        )
        .await?;
        if visible.is_none() {
            return Err(ComputeError::NeverMaterialized(format!(
                "image {template_id}"
            )));
        }
        tracing::info!(image = %template_id, "image captured");
        Ok(template_id)
    }

    /// Delete a machine image.
    pub async fn remove_template(&self, template_id: &str) -> Result<()> {
        submit_and_wait(
            &self.transport,
            &self.config,
            "/VirtualMachine/RemoveTemplate",
            template_id,
        )
        .await?;
        Ok(())
    }

    pub async fn start(&self, vm_id: &str) -> Result<()> {
        self.power_action(vm_id, "PowerOn").await
    }

    /// Stop a VM, through the guest (`ShutdownOS`) or at the virtual power
    /// button (`PowerOff`). A guest shutdown the service rejects as a
    /// business failure falls back to the hard stop.
    pub async fn stop(&self, vm_id: &str, force: bool) -> Result<()> {
        if force {
            return self.power_action(vm_id, "PowerOff").await;
        }
        match self.power_action(vm_id, "ShutdownOS").await {
            Err(ComputeError::Cloud(CloudError::Task(message))) => {
                tracing::warn!(%vm_id, %message, "guest shutdown rejected, forcing power off");
                self.power_action(vm_id, "PowerOff").await
            }
            other => other,
        }
    }

    pub async fn reboot(&self, vm_id: &str) -> Result<()> {
        self.power_action(vm_id, "RebootOS").await
    }

    pub async fn suspend(&self, vm_id: &str) -> Result<()> {
        self.power_action(vm_id, "Suspend").await
    }

    async fn power_action(&self, vm_id: &str, action: &str) -> Result<()> {
        let path = format!("/VirtualMachine/{vm_id}/{action}");
        let outcome = submit_and_wait(&self.transport, &self.config, &path, "").await?;
        if outcome.is_none() {
            tracing::warn!(%vm_id, action, "power action reported no task");
        }
        Ok(())
    }

    /// Poll the VM record until it reports stopped. `Ok(false)` means the
    /// deadline lapsed first.
    async fn wait_until_stopped(&self, vm_id: &str, deadline: Option<Duration>) -> Result<bool> {
        let stopped = poll_until(self.config.poll_interval, deadline, || {
            probe_stopped(&self.transport, vm_id)
        })
        .await?;
        Ok(stopped.is_some())
    }
}

fn unquote(s: &str) -> String {
    s.trim().trim_matches('"').to_string()
}

async fn fetch_record<T>(transport: &T, id: &str) -> stratus_cloud::Result<Option<VmRecord>>
where
    T: Transport + ?Sized,
{
    let path = format!("/VirtualMachine/{id}?$filter=IsRemoved eq false");
    let body = match transport.get(&path).await? {
        Some(b) if !b.is_empty() => b,
        _ => return Ok(None),
    };
    let record: VmRecord = serde_json::from_str(&body)?;
    Ok(if record.is_removed { None } else { Some(record) })
}

async fn probe_stopped<T>(transport: &T, vm_id: &str) -> stratus_cloud::Result<Option<()>>
where
    T: Transport + ?Sized,
{
    let record = fetch_record(transport, vm_id).await?;
    Ok(record
        .filter(|r| r.power_state() == PowerState::Stopped)
        .map(|_| ()))
}

async fn probe_template<T>(transport: &T, template_id: &str) -> stratus_cloud::Result<Option<()>>
where
    T: Transport + ?Sized,
{
    let record = fetch_record(transport, template_id).await?;
    Ok(record.filter(|r| r.is_template).map(|_| ()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquote_strips_json_string_wrapping() {
        assert_eq!(unquote("\"vm-9\""), "vm-9");
        assert_eq!(unquote(" vm-9 "), "vm-9");
        assert_eq!(unquote("vm-9"), "vm-9");
    }
}
