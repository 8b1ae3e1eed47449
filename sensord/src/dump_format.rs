//! Diagnostic dump rendering (§6 "Diagnostic dump").
//!
//! `sensord_core::DumpSnapshot` only gathers data; turning it into the
//! text a shell user reads or the `--proto` machine-readable payload is
//! this binary's job, same split as `evo_hal` keeps between its core state
//! and anything that prints it.

use sensord_core::DumpSnapshot;

pub fn dump_text(snapshot: &DumpSnapshot) -> String {
    let mut out = String::new();

    out.push_str("sensors:\n");
    for s in &snapshot.sensors {
        out.push_str(&format!(
            "  [{}] {} ({}) debug={} virtual={} dynamic={}\n",
            s.handle, s.name, s.sensor_type, s.debug, s.virtual_flag, s.is_dynamic
        ));
    }

    out.push_str("recent events:\n");
    for e in &snapshot.recent_events {
        let payload = e.payload_summary.as_deref().unwrap_or("<masked>");
        out.push_str(&format!(
            "  handle={} stale={} ts_ns={} payload={}\n",
            e.handle, e.stale, e.timestamp_ns, payload
        ));
    }

    out.push_str("active sensors:\n");
    for a in &snapshot.active_sensors {
        out.push_str(&format!("  handle={} owners={}\n", a.handle, a.owner_count));
    }

    out.push_str(&format!("socket buffer capacity: {}\n", snapshot.socket_buffer_capacity));
    out.push_str(&format!(
        "wakelock: {} ({})\n",
        snapshot.wakelock_name,
        if snapshot.wakelock_held { "held" } else { "released" }
    ));
    out.push_str(&format!(
        "operating mode: {}{}\n",
        snapshot.operating_mode,
        snapshot
            .allowlist
            .as_ref()
            .map(|a| format!(" (allowlist={a})"))
            .unwrap_or_default()
    ));
    out.push_str(&format!("privacy enabled: {}\n", snapshot.privacy_enabled));

    out.push_str("connections:\n");
    for c in &snapshot.connections {
        out.push_str(&format!(
            "  id={} package={} uid={} subscribed={:?} queued={} needs_wakelock={}\n",
            c.id, c.op_package, c.uid, c.subscribed_handles, c.socket_len, c.needs_wakelock
        ));
    }

    out.push_str("registration ring (reverse-chronological):\n");
    for r in &snapshot.registration_ring {
        out.push_str(&format!(
            "  ts_ns={} package={} handle={} activate={} ok={}\n",
            r.timestamp_ns, r.op_package, r.handle, r.activate, r.result_ok
        ));
    }

    out
}

pub fn dump_binary(snapshot: &DumpSnapshot) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensord_core::DumpSnapshot;

    fn empty_snapshot() -> DumpSnapshot {
        DumpSnapshot {
            sensors: Vec::new(),
            recent_events: Vec::new(),
            active_sensors: Vec::new(),
            socket_buffer_capacity: 8,
            wakelock_held: false,
            wakelock_name: "SensorService_wakelock".into(),
            operating_mode: "Normal".into(),
            allowlist: None,
            privacy_enabled: false,
            connections: Vec::new(),
            registration_ring: Vec::new(),
        }
    }

    #[test]
    fn text_dump_contains_every_section_header() {
        let text = dump_text(&empty_snapshot());
        for header in [
            "sensors:",
            "recent events:",
            "active sensors:",
            "socket buffer capacity:",
            "wakelock:",
            "operating mode:",
            "privacy enabled:",
            "connections:",
            "registration ring",
        ] {
            assert!(text.contains(header), "missing section {header}");
        }
    }

    #[test]
    fn binary_dump_round_trips_through_bincode() {
        let snapshot = empty_snapshot();
        let bytes = dump_binary(&snapshot).unwrap();
        let decoded: DumpSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.wakelock_name, snapshot.wakelock_name);
    }
}
