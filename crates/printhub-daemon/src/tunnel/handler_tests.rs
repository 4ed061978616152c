use super::*;

use crate::storage::ConfigStore;

async fn handler() -> TunnelHandler {
    let store = ConfigStore::open_in_memory().await.unwrap();
    TunnelHandler::new(Arc::new(HubContext::new(store)))
}

fn ack_of(dispatch: &Dispatch) -> serde_json::Value {
    assert_eq!(
        dispatch.replies.len(),
        1,
        "expected exactly one reply, got {:?}",
        dispatch.replies
    );
    let ack: serde_json::Value = serde_json::from_str(&dispatch.replies[0]).unwrap();
    assert_eq!(ack["type"], "command_ack");
    ack
}

fn add_frame(command_id: &str, serial: &str) -> String {
    format!(
        r#"{{"type":"configure_printer","command_id":"{command_id}","action":"add",
            "printer":{{"id":"p1","connection_type":"bambu","serial_number":"{serial}",
                       "access_code":"12345678","ip_address":"10.0.0.5"}}}}"#
    )
}

// ---------------------------------------------------------------------------
// configure_printer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn configure_printer_add_then_remove() {
    let handler = handler().await;

    let dispatch = handler.handle_text(&add_frame("c1", "S1")).await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["command_id"], "c1");
    assert_eq!(ack["success"], true);
    assert!(dispatch.event.is_none());
    assert_eq!(handler.hub.fleet.lock().await.find_by_serial("S1"), Some(0));

    let dispatch = handler
        .handle_text(
            r#"{"type":"configure_printer","command_id":"c2","action":"remove",
                "printer":{"serial_number":"S1"}}"#,
        )
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["command_id"], "c2");
    assert_eq!(ack["success"], true);
    assert!(handler.hub.fleet.lock().await.find_by_serial("S1").is_none());
}

#[tokio::test]
async fn configure_printer_rejects_duplicates() {
    let handler = handler().await;
    handler.handle_text(&add_frame("c1", "S1")).await;

    let dispatch = handler.handle_text(&add_frame("c2", "S1")).await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], false);
    assert!(ack["error"].as_str().unwrap().contains("already configured"));
}

#[tokio::test]
async fn configure_printer_requires_serial_and_type() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(
            r#"{"type":"configure_printer","command_id":"c1","action":"add",
                "printer":{"ip_address":"10.0.0.5"}}"#,
        )
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["error"], "Missing serial_number or connection_type");
}

#[tokio::test]
async fn configure_printer_unknown_action_fails() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(r#"{"type":"configure_printer","command_id":"c1","action":"rotate"}"#)
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["error"], "Unknown action: rotate");
}

#[tokio::test]
async fn configure_printer_update_preserves_slot() {
    let handler = handler().await;
    handler.handle_text(&add_frame("c1", "S1")).await;
    handler.handle_text(&add_frame("c2", "S2")).await;

    let dispatch = handler
        .handle_text(
            r#"{"type":"configure_printer","command_id":"c3","action":"update",
                "printer":{"connection_type":"bambu","serial_number":"S2",
                           "access_code":"87654321","ip_address":"10.0.0.99"}}"#,
        )
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], true);

    let fleet = handler.hub.fleet.lock().await;
    assert_eq!(fleet.find_by_serial("S2"), Some(1));
    assert_eq!(fleet.get(1).unwrap().record.address, "10.0.0.99");
}

// ---------------------------------------------------------------------------
// printer_command
// ---------------------------------------------------------------------------

#[tokio::test]
async fn printer_command_to_unknown_printer() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(
            r#"{"type":"printer_command","command_id":"c9","printer_id":"S1","action":"pause"}"#,
        )
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["command_id"], "c9");
    assert_eq!(ack["success"], false);
    assert_eq!(ack["error"], "Printer not found");
}

#[tokio::test]
async fn printer_command_to_disconnected_printer() {
    let handler = handler().await;
    handler.handle_text(&add_frame("c1", "S1")).await;

    let dispatch = handler
        .handle_text(
            r#"{"type":"printer_command","command_id":"c9","printer_id":"S1","action":"pause"}"#,
        )
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["error"], "Printer not connected");
}

#[tokio::test]
async fn printer_command_unknown_action() {
    let handler = handler().await;
    handler.handle_text(&add_frame("c1", "S1")).await;

    let dispatch = handler
        .handle_text(
            r#"{"type":"printer_command","command_id":"c9","printer_id":"S1","action":"eject"}"#,
        )
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["error"], "Printer not connected");
}

// ---------------------------------------------------------------------------
// hub_command / hub_config
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hub_command_gpio_set_records_pin() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(
            r#"{"type":"hub_command","command_id":"c4","action":"gpio_set",
                "gpio_pin":4,"gpio_state":true}"#,
        )
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], true);
    assert_eq!(handler.hub.pins.get(4), Some(true));
}

#[tokio::test]
async fn hub_command_gpio_set_requires_pin() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(r#"{"type":"hub_command","command_id":"c4","action":"gpio_set"}"#)
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["error"], "Invalid GPIO pin");
}

#[tokio::test]
async fn hub_command_disconnect_acks_then_signals() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(r#"{"type":"hub_command","command_id":"c5","action":"disconnect"}"#)
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], true);
    assert_eq!(dispatch.event, Some(SessionEvent::DisconnectRequested));
}

#[tokio::test]
async fn hub_config_persists_name() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(r#"{"type":"hub_config","command_id":"c6","hub_name":"Shop"}"#)
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], true);

    let name = handler
        .hub
        .store
        .namespace(NS_HUB)
        .get_string("hub_name", "")
        .await
        .unwrap();
    assert_eq!(name, "Shop");
}

#[tokio::test]
async fn hub_welcome_authenticates_and_persists_name() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(r#"{"type":"hub_welcome","hub_id":"HUB-1","hub_name":"Shop"}"#)
        .await;
    assert!(dispatch.replies.is_empty());
    assert_eq!(dispatch.event, Some(SessionEvent::Authenticated));

    let name = handler
        .hub
        .store
        .namespace(NS_HUB)
        .get_string("hub_name", "")
        .await
        .unwrap();
    assert_eq!(name, "Shop");
}

// ---------------------------------------------------------------------------
// Dispatch edges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn print_command_acks_not_implemented() {
    let handler = handler().await;
    let dispatch = handler
        .handle_text(r#"{"type":"print_command","command_id":"c7","action":"start"}"#)
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["error"], "print_command not implemented");

    let dispatch = handler
        .handle_text(r#"{"type":"discover_printers","command_id":"c8"}"#)
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["error"], "discover_printers not implemented");
}

#[tokio::test]
async fn unknown_type_and_error_are_dropped_without_ack() {
    let handler = handler().await;

    let dispatch = handler
        .handle_text(r#"{"type":"telepathy","command_id":"c1"}"#)
        .await;
    assert!(dispatch.replies.is_empty());
    assert!(dispatch.event.is_none());

    let dispatch = handler
        .handle_text(r#"{"type":"error","code":"E42","message":"tenant suspended"}"#)
        .await;
    assert!(dispatch.replies.is_empty());
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let handler = handler().await;
    let dispatch = handler.handle_text("not json at all").await;
    assert!(dispatch.replies.is_empty());

    let dispatch = handler.handle_text(r#"{"no_type_here":true}"#).await;
    assert!(dispatch.replies.is_empty());
}

#[tokio::test]
async fn malformed_payload_with_command_id_still_acks() {
    let handler = handler().await;
    // Envelope parses, but printer_command requires printer_id.
    let dispatch = handler
        .handle_text(r#"{"type":"printer_command","command_id":"c9"}"#)
        .await;
    let ack = ack_of(&dispatch);
    assert_eq!(ack["command_id"], "c9");
    assert_eq!(ack["success"], false);
    assert_eq!(ack["error"], "Invalid payload");
}

// ---------------------------------------------------------------------------
// Status broadcast frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_covers_occupied_slots() {
    let handler = handler().await;
    handler.handle_text(&add_frame("c1", "S1")).await;
    handler.handle_text(&add_frame("c2", "S2")).await;

    let frames = handler.build_status_broadcast().await;
    assert_eq!(frames.len(), 2);
    let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(first["type"], "printer_status");
    assert_eq!(first["printer_id"], "S1");
    assert_eq!(first["status"], "offline");
}

#[test]
fn status_frame_maps_unknown_to_offline() {
    let snapshot = PrinterSnapshot {
        connected: true,
        state: PrinterState::Unknown,
        ..Default::default()
    };
    let msg = status_frame("S1", &snapshot);
    assert_eq!(msg.status, "offline");
}

#[test]
fn status_frame_omits_zero_optionals() {
    let snapshot = PrinterSnapshot {
        connected: true,
        state: PrinterState::Printing,
        progress_percent: 42,
        remaining_seconds: 1800,
        nozzle_temp: 210.5,
        bed_temp: 60.0,
        ..Default::default()
    };
    let msg = status_frame("S1", &snapshot);
    assert_eq!(msg.status, "printing");
    assert_eq!(msg.progress_percentage, Some(42));
    assert_eq!(msg.remaining_time_seconds, Some(1800));
    assert_eq!(msg.current_layer, None);
    assert_eq!(msg.total_layers, None);
    assert_eq!(msg.error_message, None);
    assert_eq!(msg.temperatures.nozzle, 210.5);
    assert_eq!(msg.temperatures.bed, 60.0);
}
