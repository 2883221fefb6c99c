use chrono::Utc;
use serde_json::json;

use crate::devices::ChannelStates;
use crate::services::poller::{MonitorEvent, TriggerEvent};

pub trait StatusFormatter: Send + Sync {
    fn format_status(&self, relay_status: Option<u8>, input_status: Option<u8>) -> String;
    fn format_monitor_header(&self) -> String;
    fn format_monitor_event(&self, event: &MonitorEvent) -> String;
    fn format_trigger_header(&self) -> String;
    fn format_trigger_event(&self, event: &TriggerEvent) -> String;
}

fn bit_cell(states: Option<ChannelStates>, index: usize) -> String {
    match states {
        Some(s) => (s.to_array()[index] as u8).to_string(),
        None => "?".to_string(),
    }
}

fn squares(states: ChannelStates) -> String {
    states
        .to_array()
        .iter()
        .map(|&on| if on { "■" } else { "□" })
        .collect::<Vec<_>>()
        .join(" ")
}

fn named(states: Option<ChannelStates>, prefix: &str) -> String {
    match states {
        Some(s) => s
            .iter()
            .map(|(ch, on)| format!("{}{}={}", prefix, ch, if on { "ON" } else { "off" }))
            .collect::<Vec<_>>()
            .join(" "),
        None => "no response".to_string(),
    }
}

pub struct ConsoleFormatter;

impl StatusFormatter for ConsoleFormatter {
    fn format_status(&self, relay_status: Option<u8>, input_status: Option<u8>) -> String {
        let mut output = String::new();
        match relay_status {
            Some(status) => output.push_str(&format!("  Status: 0x{:02X} = {:08b}\n", status, status)),
            None => output.push_str("  Status: no response\n"),
        }
        output.push_str(&format!(
            "  Relays: {}\n",
            named(relay_status.map(ChannelStates::from_relay_status), "R")
        ));
        output.push_str(&format!(
            "  Inputs: {}",
            named(input_status.map(ChannelStates::from_input_status), "IN")
        ));
        output
    }

    fn format_monitor_header(&self) -> String {
        let mut output = String::new();
        output.push_str(&"=".repeat(60));
        output.push_str("\n485 RELAY 4CH - REAL-TIME MONITOR\n");
        output.push_str(&"=".repeat(60));
        output.push_str("\n\nInputs are active low: connect to GND = triggered (shows 1)\n");
        output.push_str("Press Ctrl+C to stop\n\n");
        output.push_str("Relays (F01)  | Inputs (F02)\n");
        output.push_str("R4 R3 R2 R1   | IN4 IN3 IN2 IN1\n");
        output.push_str(&"-".repeat(60));
        output
    }

    fn format_monitor_event(&self, event: &MonitorEvent) -> String {
        let relays = event.relays();
        let inputs = event.inputs();
        let marker = if event.is_change { " <- CHANGE" } else { "" };
        format!(
            " {}  {}  {}  {}    |  {}   {}   {}   {}  {}",
            bit_cell(relays, 3),
            bit_cell(relays, 2),
            bit_cell(relays, 1),
            bit_cell(relays, 0),
            bit_cell(inputs, 3),
            bit_cell(inputs, 2),
            bit_cell(inputs, 1),
            bit_cell(inputs, 0),
            marker
        )
    }

    fn format_trigger_header(&self) -> String {
        let mut output = String::new();
        output.push_str(&"=".repeat(50));
        output.push_str("\nINPUT → RELAY TRIGGER\n");
        output.push_str(&"=".repeat(50));
        output.push_str("\n\n  IN1 → Relay 1\n  IN2 → Relay 2\n  IN3 → Relay 3\n  IN4 → Relay 4\n\n");
        output.push_str("Connect input to GND to trigger its relay\nPress Ctrl+C to stop\n\n");
        output.push_str("IN:  1 2 3 4  |  Relay: 1 2 3 4\n");
        output.push_str(&"-".repeat(50));
        output
    }

    fn format_trigger_event(&self, event: &TriggerEvent) -> String {
        let inputs = match event.inputs {
            Some(inputs) => squares(inputs),
            None => "? ? ? ?".to_string(),
        };
        format!("     {}  |        {}  ", inputs, squares(event.relays))
    }
}

pub struct JsonFormatter;

impl StatusFormatter for JsonFormatter {
    fn format_status(&self, relay_status: Option<u8>, input_status: Option<u8>) -> String {
        let value = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "relay_status": relay_status,
            "input_status": input_status,
            "relays": relay_status.map(ChannelStates::from_relay_status),
            "inputs": input_status.map(ChannelStates::from_input_status),
        });
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }

    fn format_monitor_header(&self) -> String {
        String::new()
    }

    fn format_monitor_event(&self, event: &MonitorEvent) -> String {
        let value = json!({
            "timestamp": event.timestamp.to_rfc3339(),
            "change": event.is_change,
            "relays": event.relays(),
            "inputs": event.inputs(),
        });
        value.to_string()
    }

    fn format_trigger_header(&self) -> String {
        String::new()
    }

    fn format_trigger_event(&self, event: &TriggerEvent) -> String {
        let switched: Vec<_> = event
            .switched
            .iter()
            .map(|(ch, on)| json!({ "relay": ch.number(), "on": on }))
            .collect();
        let value = json!({
            "timestamp": event.timestamp.to_rfc3339(),
            "inputs": event.inputs,
            "relays": event.relays,
            "switched": switched,
        });
        value.to_string()
    }
}
