//! Placeholder-to-confirmed transitions and address/id cross-referencing.

mod common;

use std::sync::Arc;

use common::TestHarness;
use mediacast::common::DeviceIdentity;
use mediacast::devices::ProfileState;

#[test]
fn identified_placeholder_is_cross_referenced() {
    let h = TestHarness::builder()
        .device("kitchen.conf", "device = 10.0.0.5\ntranscode.quality = low\n")
        .build();
    let registry = h.app.registry();

    let profile = h.app.on_device_seen("10.0.0.5");
    assert_eq!(profile.state(), ProfileState::Placeholder);
    assert!(registry.lookup(&DeviceIdentity::from_stable_id("uuid:k")).is_none());

    assert!(h.app.on_device_identified(&profile, "uuid:k"));
    assert_eq!(profile.state(), ProfileState::Confirmed);

    let by_id = registry.lookup(&DeviceIdentity::from_stable_id("uuid:k")).unwrap();
    let by_addr = registry.lookup(&DeviceIdentity::from_address("10.0.0.5")).unwrap();
    assert!(Arc::ptr_eq(&by_id, &by_addr));
    assert_eq!(profile.get_string("transcode.quality", ""), "low");
}

#[test]
fn stable_id_profile_takes_priority_over_address_profile() {
    let h = TestHarness::builder()
        .device("by-address.conf", "device = 10.0.0.5\ntranscode.quality = low\n")
        .build();

    let profile = h.app.on_device_seen("10.0.0.5");
    h.app.on_device_identified(&profile, "uuid:k");
    assert_eq!(profile.get_string("transcode.quality", ""), "low");

    h.write_device("by-id.conf", "device = uuid:k\ntranscode.quality = high\n");
    assert_eq!(profile.get_string("transcode.quality", ""), "high");
    assert_eq!(
        profile.device_file().unwrap().file_name().unwrap(),
        "by-id.conf"
    );
}

#[test]
fn roaming_device_keeps_its_profile() {
    let h = TestHarness::builder()
        .device("tv.conf", "device = uuid:tv\ntranscode.quality = high\n")
        .build();

    let first = h.app.on_device_seen("10.0.0.5");
    h.app.on_device_identified(&first, "uuid:tv");
    h.app.disconnect("10.0.0.5");
    drop(first);

    let second = h.app.on_device_seen("10.0.0.77");
    assert_eq!(second.get_string("transcode.quality", ""), "");
    h.app.on_device_identified(&second, "uuid:tv");
    assert_eq!(second.get_string("transcode.quality", ""), "high");
    assert_eq!(h.app.registry().address_for("uuid:tv").as_deref(), Some("10.0.0.77"));
    assert!(h.app.registry().stable_id_for("10.0.0.5").is_none());
}

#[test]
fn address_reuse_overwrites_cross_reference() {
    let h = TestHarness::builder().build();
    let registry = h.app.registry();

    registry.cross_reference("uuid:a", "10.0.0.9");
    registry.cross_reference("uuid:b", "10.0.0.9");

    assert_eq!(registry.stable_id_for("10.0.0.9").as_deref(), Some("uuid:b"));
    assert!(registry.address_for("uuid:a").is_none());
}

#[test]
fn repeated_identification_is_a_no_op() {
    let h = TestHarness::builder().build();
    let profile = h.app.on_device_seen("10.0.0.5");
    assert!(h.app.on_device_identified(&profile, "uuid:x"));
    let generation = profile.generation();
    assert!(!h.app.on_device_identified(&profile, "uuid:x"));
    assert!(!h.app.on_device_identified(&profile, "   "));
    assert_eq!(profile.generation(), generation);
}

#[test]
fn in_memory_writes_survive_identification() {
    let h = TestHarness::builder().global("subtitles.enabled = true\n").build();
    let profile = h.app.on_device_seen("10.0.0.5");
    profile.write("subtitles.enabled", false).unwrap();
    assert!(!profile.get_bool("subtitles.enabled", true));

    h.app.on_device_identified(&profile, "uuid:new");
    assert!(!profile.get_bool("subtitles.enabled", true));
    assert!(!profile.is_customized());
}

#[test]
fn cross_referenced_placeholder_picks_up_new_device_file() {
    let h = TestHarness::builder().global("transcode.quality = medium\n").build();
    let first = h.app.on_device_seen("10.0.0.5");
    h.app.on_device_identified(&first, "uuid:tv");
    h.app.disconnect("10.0.0.5");
    drop(first);

    let placeholder = h.app.on_device_seen("10.0.0.5");
    assert_eq!(placeholder.get_string("transcode.quality", ""), "medium");

    h.write_device("tv.conf", "device = uuid:tv\ntranscode.quality = high\n");

    let via_registry = h.app.registry().lookup(&DeviceIdentity::from_address("10.0.0.5")).unwrap();
    assert_eq!(via_registry.get_string("transcode.quality", ""), "high");
    assert_eq!(placeholder.get_string("transcode.quality", ""), "high");
    assert!(!placeholder.is_confirmed());
}
