//! Blocking twin of [`crate::CulliganApi`].
//!
//! Shares the same [`Session`] core, so both clients build identical requests
//! and interpret responses identically. Don't call it from inside an async
//! runtime when using the default `reqwest::blocking::Client`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use serde_json::Value;

use crate::command::{Action, DEFAULT_BYPASS_SECS};
use crate::credentials::{AuthState, LinkedCredentials};
use crate::device::{Device, RegistryEntry};
use crate::error::Result;
use crate::session::{Session, DEFAULT_BASE_URL};
use crate::transport::{ApiRequest, ApiResponse, BlockingTransport};

pub struct BlockingCulliganApi<T = reqwest::blocking::Client> {
    session: Session,
    transport: Mutex<Option<T>>,
}

impl BlockingCulliganApi<reqwest::blocking::Client> {
    pub fn new(email: &str, password: &str, app_id: &str) -> Self {
        Self::with_transport(email, password, app_id, None)
    }
}

impl<T> BlockingCulliganApi<T>
where
    T: BlockingTransport + Clone + Default,
{
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

    fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(T::default)
            .clone();
        transport.request(request)
    }

    pub fn sign_in(&self) -> Result<()> {
        debug!("Signing in user: {}", self.session.email());
        let response = self.send(self.session.sign_in_request())?;
        self.session.apply_auth_response(response)
    }

    pub fn refresh_auth(&self) -> Result<()> {
        debug!("Refreshing token for user: {}", self.session.email());
        let response = self.send(self.session.refresh_request()?)?;
        self.session.apply_auth_response(response)
    }

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

    pub fn get_user_profile(&self) -> Result<Value> {
        let response = self.send(self.session.profile_request()?)?;
        self.session.parse_profile(response)
    }

    pub fn get_user_metadata(&self) -> Result<Value> {
        let response = self.send(self.session.metadata_request()?)?;
        self.session.parse_metadata(response)
    }

    pub fn get_device_registry(&self) -> Result<Vec<RegistryEntry>> {
        self.get_device_registry_with_headers(HashMap::new())
    }

    pub fn get_device_registry_with_headers(
        &self,
        headers: HashMap<String, String>,
    ) -> Result<Vec<RegistryEntry>> {
        let response = self.send(self.session.registry_request(headers)?)?;
        self.session.parse_registry(response)
    }

    pub fn get_devices(&self) -> Result<Vec<Device>> {
        let entries = self.get_device_registry()?;
        Ok(entries.iter().map(Device::from_entry).collect())
    }

    pub fn get_device_data(&self, serial_number: &str) -> Result<Value> {
        let response = self.send(self.session.device_data_request(serial_number)?)?;
        self.session.parse_device_data(response)
    }

    pub fn refresh_properties(&self, device: &mut Device) -> Result<bool> {
        let response = self.send(self.session.device_data_request(&device.serial_number)?)?;
        self.session.apply_device_data(device, response)
    }

    pub fn dispatch(
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

        let response = self.send(self.session.command_request(&payload)?)?;
        self.session.parse_command_response(response)
    }

    pub fn perform(&self, device: &Device, action: Action, duration: u32) -> Result<bool> {
        let binding = action.binding();
        self.dispatch(device, binding.command.as_str(), binding.active, duration)
    }

    pub fn get_telemetry(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::GetTelemetry, DEFAULT_BYPASS_SECS)
    }

    pub fn start_vacation_mode(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::StartVacationMode, DEFAULT_BYPASS_SECS)
    }

    pub fn stop_vacation_mode(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::StopVacationMode, DEFAULT_BYPASS_SECS)
    }

    pub fn start_bypass_mode(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::StartBypassMode, DEFAULT_BYPASS_SECS)
    }

    pub fn start_bypass_timed_mode(&self, device: &Device, seconds: u32) -> Result<bool> {
        self.perform(device, Action::StartBypassTimedMode, seconds)
    }

    pub fn stop_bypass_mode(&self, device: &Device) -> Result<bool> {
        self.perform(device, Action::StopBypassMode, DEFAULT_BYPASS_SECS)
    }
}
