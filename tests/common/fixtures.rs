//! Static journal corpora used across harnesses.
//!
//! Every line is a complete journal record as the game writes it, without
//! the trailing newline.

/// A short, well-formed session: header, commander, a few docking and
/// travel events.
pub const SESSION: &[&str] = &[
    r#"{ "timestamp":"2024-01-15T10:00:00Z", "event":"Fileheader", "part":1, "language":"English/UK", "gameversion":"4.0.0.1800", "build":"r299999/r0 " }"#,
    r#"{ "timestamp":"2024-01-15T10:00:05Z", "event":"Commander", "FID":"F1234567", "Name":"Jameson" }"#,
    r#"{ "timestamp":"2024-01-15T10:00:06Z", "event":"LoadGame", "FID":"F1234567", "Commander":"Jameson", "Ship":"CobraMkIII", "ShipID":1, "GameMode":"Solo" }"#,
    r#"{ "timestamp":"2024-01-15T10:00:10Z", "event":"Location", "Docked":true, "StarSystem":"Shinrarta Dezhra", "SystemAddress":3932277478106, "StarPos":[55.71875,17.59375,27.15625] }"#,
    r#"{ "timestamp":"2024-01-15T10:01:00Z", "event":"Undocked", "StationName":"Jameson Memorial", "MarketID":128666762 }"#,
    r#"{ "timestamp":"2024-01-15T10:05:00Z", "event":"FSDJump", "StarSystem":"LHS 3447", "SystemAddress":5306465653474, "StarPos":[-43.18750,-5.28125,56.15625], "JumpDist":9.5 }"#,
    r#"{ "timestamp":"2024-01-15T10:06:00Z", "event":"FSSDiscoveryScan", "Progress":0.25, "BodyCount":9, "NonBodyCount":3, "SystemName":"LHS 3447" }"#,
    r#"{ "timestamp":"2024-01-15T10:07:00Z", "event":"Scan", "ScanType":"Detailed", "BodyName":"LHS 3447 A 1", "BodyID":4, "Parents":[ {"Star":1}, {"Null":0} ], "StarSystem":"LHS 3447", "SystemAddress":5306465653474, "DistanceFromArrivalLS":12.5, "PlanetClass":"Icy body" }"#,
    r#"{ "timestamp":"2024-01-15T10:10:00Z", "event":"DockingRequested", "StationName":"Trevithick Dock", "MarketID":3223343616 }"#,
    r#"{ "timestamp":"2024-01-15T10:10:05Z", "event":"DockingGranted", "LandingPad":12, "StationName":"Trevithick Dock", "MarketID":3223343616 }"#,
    r#"{ "timestamp":"2024-01-15T10:11:00Z", "event":"Docked", "StationName":"Trevithick Dock", "StationType":"Orbis", "StarSystem":"LHS 3447", "MarketID":3223343616, "StationFaction":{ "Name":"Pilots Federation Local Branch" }, "StationEconomy":"$economy_HighTech;" }"#,
];

/// Transient events that are handed to sinks but never stored.
pub const TRANSIENT: &[&str] = &[
    r#"{ "timestamp":"2024-01-15T10:02:00Z", "event":"Music", "MusicTrack":"Supercruise" }"#,
    r#"{ "timestamp":"2024-01-15T10:03:00Z", "event":"UnderAttack", "Target":"You" }"#,
];

/// Lines the parser rejects as malformed.
pub const MALFORMED: &[&str] = &[
    r#"{ "timestamp":"2024-01-15T10:00:00Z", "event":"Docked", "StationName":"#,
    r#"[ "not", "an", "object" ]"#,
    r#"{ "event":"Docked" }"#,
    r#"{ "timestamp":"last tuesday", "event":"Docked" }"#,
    r#"{ "timestamp":"2024-01-15T10:00:00Z" }"#,
    "\u{0}\u{1}garbage",
];

/// Event names a newer game client might write.
pub const FUTURE_EVENTS: &[&str] = &[
    r#"{ "timestamp":"2031-01-01T00:00:00Z", "event":"ColonisationBeaconDeployed", "Beacon":7 }"#,
    r#"{ "timestamp":"2031-01-01T00:00:01Z", "event":"ThargoidTea", "Flavour":"Caustic" }"#,
];

/// Two distinct events sharing commander, timestamp, file and tag.
pub const SAME_SECOND_DOCKING: &[&str] = &[
    r#"{ "timestamp":"2024-01-15T12:00:00Z", "event":"DockingRequested", "StationName":"Alpha", "MarketID":1 }"#,
    r#"{ "timestamp":"2024-01-15T12:00:00Z", "event":"DockingRequested", "StationName":"Beta", "MarketID":2 }"#,
];

/// `n` synthetic, distinct journal lines for throughput tests.
pub fn synthetic_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let event = match i % 4 {
                0 => "FSDJump",
                1 => "Scan",
                2 => "Docked",
                _ => "ReceiveText",
            };
            format!(
                r#"{{ "timestamp":"2024-01-15T{:02}:{:02}:{:02}Z", "event":"{}", "Seq":{}, "StarSystem":"Synthetic {}" }}"#,
                i / 3600 % 24,
                i / 60 % 60,
                i % 60,
                event,
                i,
                i % 97,
            )
        })
        .collect()
}

/// Join lines into file content, each line newline-terminated.
pub fn as_file(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}
