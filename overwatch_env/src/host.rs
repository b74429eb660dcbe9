//! Outbound host-message channel.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Ids captured by a closed box-select polygon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionReport {
    /// Tracked entities (personnel/vehicles) inside the polygon
    pub person: Vec<String>,

    /// Equipment/camera anchors inside the polygon
    pub camera: Vec<String>,

    /// Building anchors inside the polygon
    pub buildings: Vec<String>,
}

impl SelectionReport {
    /// Returns true if nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.person.is_empty() && self.camera.is_empty() && self.buildings.is_empty()
    }
}

/// Messages posted to the embedding page.
///
/// Encoded as `{"cmd": "...", "param": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "param")]
pub enum HostMessage {
    /// Box-select completion
    #[serde(rename = "selectBack")]
    SelectBack(SelectionReport),
}

impl HostMessage {
    /// Encodes the message in its wire form.
    pub fn to_json(&self) -> Result<String, EnvError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Delivers [`HostMessage`]s to the host page.
pub trait HostChannel {
    /// Posts a message.
    ///
    /// # Returns
    /// * `Ok(())` - Message handed to the host
    /// * `Err(EnvError::HostChannel)` - The host is gone or refused it
    fn post(&mut self, message: HostMessage) -> Result<(), EnvError>;
}

impl<T: HostChannel + ?Sized> HostChannel for Rc<RefCell<T>> {
    fn post(&mut self, message: HostMessage) -> Result<(), EnvError> {
        self.borrow_mut().post(message)
    }
}
