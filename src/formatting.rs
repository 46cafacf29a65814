//! Alert text for emergency events.

use crate::core::Event;

/// Subject and body of an emergency email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyMessage {
    pub subject: String,
    pub body: String,
}

/// Builds the alert text for an emergency event.
pub fn format_emergency(event: &Event) -> EmergencyMessage {
    EmergencyMessage {
        subject: format!("Emergency alert - vehicle {}", event.vehicle_identifier),
        body: format!(
            "An emergency event of type {} was detected for the vehicle with plate {}. Status: {}",
            event.kind, event.vehicle_identifier, event.status
        ),
    }
}
