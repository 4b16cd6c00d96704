use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use serde_json::Value;

use crate::command::{Action, DEFAULT_BYPASS_SECS};
use crate::credentials::{AuthState, LinkedCredentials};
use crate::device::{Device, RegistryEntry};
use crate::error::Result;
use crate::session::{Session, DEFAULT_BASE_URL};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Async client for the Culligan IoT cloud
pub struct CulliganApi<T = reqwest::Client> {
    session: Session,
    transport: Mutex<Option<T>>,
}

impl CulliganApi<reqwest::Client> {
    pub fn new(email: &str, password: &str, app_id: &str) -> Self {
        Self::with_transport(email, password, app_id, None)
    }
}

impl<T> CulliganApi<T>
where
    T: Transport + Clone + Default,
{
    /// Build a client that sends through `transport`, or a lazily created
    /// default one when `None`
    pub fn with_transport(email: &str, password: &str, app_id: &str, transport: Option<T>) -> Self {
        Self::new_with_base_url(email, password, app_id, transport, DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(
        email: &str,
        password: &str,
        app_id: &str,
        transport: Option<T>,
        base_url: &str,
    ) -> Self {
        Self {
            session: Session::new(email, password, app_id, base_url),
            transport: Mutex::new(transport),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        self.session.base_url()
    }

    fn transport(&self) -> T {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(T::default)
            .clone()
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let transport = self.transport();
        transport.request(request).await
    }

    pub async fn sign_in(&self) -> Result<()> {
        debug!("Signing in user: {}", self.session.email());
        let response = self.send(self.session.sign_in_request()).await?;
        self.session.apply_auth_response(response)
    }

    pub async fn refresh_auth(&self) -> Result<()> {
        debug!("Refreshing token for user: {}", self.session.email());
        let request = self.session.refresh_request()?;
        let response = self.send(request).await?;
        self.session.apply_auth_response(response)
    }

    /// Forget every credential and release the HTTP client. No request is sent.
    pub fn sign_out(&self) {
        self.session.sign_out();
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn check_auth(&self, require_not_expiring_soon: bool) -> Result<()> {
        self.session.check_auth(require_not_expiring_soon)
    }

    pub fn auth_header(&self) -> Result<HashMap<String, String>> {
        self.session.auth_header()
    }

    pub fn auth_state(&self) -> AuthState {
        self.session.auth_state()
    }

    pub fn export_linked_credentials(&self) -> Option<LinkedCredentials> {
        self.session.export_linked_credentials()
    }

    pub fn tracked_serials(&self) -> Vec<String> {
        self.session.tracked_serials()
    }

    pub async fn get_user_profile(&self) -> Result<Value> {
        debug!("Fetching user profile");
        let response = self.send(self.session.profile_request()?).await?;
        self.session.parse_profile(response)
    }

    pub async fn get_user_metadata(&self) -> Result<Value> {
        debug!("Fetching user metadata");
        let response = self.send(self.session.metadata_request()?).await?;
        self.session.parse_metadata(response)
    }

    pub async fn get_device_registry(&self) -> Result<Vec<RegistryEntry>> {
        self.get_device_registry_with_headers(HashMap::new()).await
    }

    /// Registry fetch with extra headers, e.g. [`Session::no_cache_header`]
    pub async fn get_device_registry_with_headers(
        &self,
        headers: HashMap<String, String>,
    ) -> Result<Vec<RegistryEntry>> {
        debug!("Fetching device registry");
        let response = self.send(self.session.registry_request(headers)?).await?;
        self.session.parse_registry(response)
    }

    pub async fn get_devices(&self) -> Result<Vec<Device>> {
        let entries = self.get_device_registry().await?;
        Ok(entries.iter().map(Device::from_entry).collect())
    }

    pub async fn get_device_data(&self, serial_number: &str) -> Result<Value> {
        debug!("Fetching data for device: {}", serial_number);
        let response = self
            .send(self.session.device_data_request(serial_number)?)
            .await?;
        self.session.parse_device_data(response)
    }

    /// Replace the device's properties with a fresh snapshot
    pub async fn refresh_properties(&self, device: &mut Device) -> Result<bool> {
        debug!("Refreshing properties for device: {}", device.serial_number);
        let response = self
            .send(self.session.device_data_request(&device.serial_number)?)
            .await?;
        self.session.apply_device_data(device, response)
    }

    /// Send `command` to the device. Commands the device doesn't support
    /// return `false` without touching the network.
    pub async fn dispatch(
        &self,
        device: &Device,
        command: &str,
        active: bool,
        duration: u32,
    ) -> Result<bool> {
        let Some(payload) = device.build_command_payload(command, active, duration) else {
            warn!(
                "Command {} is not supported by device {}",
                command, device.serial_number
            );
            return Ok(false);
        };

        debug!("Sending command to {}: {:?}", device.serial_number, payload);
        let response = self.send(self.session.command_request(&payload)?).await?;
        self.session.parse_command_response(response)
    }

    pub async fn perform(&self, device: &Device, action: Action, duration: u32) -> Result<bool> {
        let binding = action.binding();
        self.dispatch(device, binding.command.as_str(), binding.active, duration)
            .await
    }

    pub async fn get_telemetry(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::GetTelemetry, DEFAULT_BYPASS_SECS)
            .await
    }

    pub async fn start_vacation_mode(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::StartVacationMode, DEFAULT_BYPASS_SECS)
            .await
    }

    pub async fn stop_vacation_mode(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::StopVacationMode, DEFAULT_BYPASS_SECS)
            .await
    }

    pub async fn start_bypass_mode(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::StartBypassMode, DEFAULT_BYPASS_SECS)
            .await
    }

    pub async fn start_bypass_timed_mode(&self, device: &Device, seconds: u32) -> Result<bool> {
        self.perform(device, Action::StartBypassTimedMode, seconds)
            .await
    }

    pub async fn stop_bypass_mode(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::StopBypassMode, DEFAULT_BYPASS_SECS)
            .await
    }
}
