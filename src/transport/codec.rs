// src/transport/codec.rs
//! Newline-delimited JSON record codec
//!
//! One value per line of UTF-8 text. Compact `serde_json` output never
//! contains a raw newline (control characters inside strings are escaped),
//! so the newline is a safe record delimiter. Every record is decodable on
//! its own; the receiver keeps no state between records.

use crate::utils::errors::{Result, TrailError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

/// Record delimiter on the wire
pub const RECORD_DELIMITER: u8 = b'\n';

/// A message type carried over its own named channel
pub trait WireSchema: Serialize + DeserializeOwned + Send + 'static {
    /// Stable schema identity; also names the transport endpoint
    const SCHEMA: &'static str;

    /// Semantic checks run after a record is parsed
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Append one delimited record for `value` to `buf`.
///
/// A value that fails [`WireSchema::validate`] is refused here, since its
/// consumer would refuse it too.
pub fn encode_into<T: WireSchema>(value: &T, buf: &mut Vec<u8>) -> Result<()> {
    value
        .validate()
        .map_err(|e| TrailError::Encode(format!("{} record: {}", T::SCHEMA, e)))?;
    let start = buf.len();
    serde_json::to_writer(&mut *buf, value)
        .map_err(|e| TrailError::Encode(format!("{} record: {}", T::SCHEMA, e)))?;
    buf.push(RECORD_DELIMITER);
    trace!("Encoded {} record ({} bytes)", T::SCHEMA, buf.len() - start);
    Ok(())
}

/// Encode one delimited record
pub fn encode<T: WireSchema>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf)?;
    String::from_utf8(buf).map_err(|e| TrailError::Encode(e.to_string()))
}

/// Decode one record; a trailing delimiter is tolerated
pub fn decode<T: WireSchema>(line: &str) -> Result<T> {
    let line = line.trim_end_matches(['\n', '\r']);
    let value: T = serde_json::from_str(line)
        .map_err(|e| TrailError::Decode(format!("{} record: {}", T::SCHEMA, e)))?;
    value.validate()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{
        Appearance, AppearanceRegistry, PrimaryFrame, RoomKey, SecondaryFrame, Session, Track, Vec2,
    };
    use proptest::prelude::*;

    fn sample_session() -> Session {
        let mut session = Session::new(&RoomKey::new("Celeste/2-OldSite", "d-04"));
        let idle = session
            .registry
            .intern(
                &Appearance::new("characters/player/idle00")
                    .with_scale(Vec2::new(-1.0, 1.0))
                    .with_origin(Vec2::new(16.0, 32.0)),
            )
            .unwrap();
        let dash = session
            .registry
            .intern(&Appearance::new("characters/player/dash00").with_rotation(0.785_398_2))
            .unwrap();
        let berry = session
            .registry
            .intern(&Appearance::new("collectables/strawberry/normal00"))
            .unwrap();

        session.primary.push(PrimaryFrame {
            t: 0.0,
            pos: Vec2::new(0.1, 0.2),
            appearance: idle,
            color: 0xAC32_32FF,
            aux: Vec2::new(-3.0, -9.0),
        });
        session.primary.push(PrimaryFrame {
            t: 0.133,
            pos: Vec2::new(f32::MIN_POSITIVE, 1.0e-7),
            appearance: dash,
            color: 0x44B7_FFFF,
            aux: Vec2::new(f32::MAX, -0.0),
        });
        session.secondary.push(Track::from(vec![SecondaryFrame {
            t: 0.133,
            appearance: berry,
            pos: Vec2::new(321.5, 17.25),
        }]));
        session
    }

    #[test]
    fn test_round_trip() {
        let session = sample_session();
        let line = encode(&session).unwrap();
        let back: Session = decode(&line).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.primary.frames()[1].pos.x.to_bits(), f32::MIN_POSITIVE.to_bits());
        assert_eq!(back.primary.frames()[1].aux.y.to_bits(), (-0.0f32).to_bits());
    }

    #[test]
    fn test_single_line_record() {
        let mut session = sample_session();
        session.room = "line\nbreak".to_string();
        session.registry.intern(&Appearance::new("path\nwith\r\nbreaks")).unwrap();

        let line = encode(&session).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(decode::<Session>(&line).unwrap(), session);
    }

    #[test]
    fn test_wire_field_names() {
        let value: serde_json::Value = serde_json::from_str(&encode(&sample_session()).unwrap()).unwrap();
        assert_eq!(value["map"], "Celeste/2-OldSite");
        assert_eq!(value["room"], "d-04");
        assert_eq!(value["registry"]["1"]["path"], "characters/player/idle00");
        assert_eq!(value["registry"]["1"]["scale"]["x"], -1.0);
        assert_eq!(value["primary"][0]["appearance"], 1);
        assert_eq!(value["primary"][0]["color"], 0xAC32_32FFu32);
        assert!(value["primary"][0]["aux"].is_object());
        assert_eq!(value["secondary"][0][0]["appearance"], 3);
    }

    #[test]
    fn test_unknown_appearance_is_rejected() {
        let mut value: serde_json::Value =
            serde_json::from_str(&encode(&sample_session()).unwrap()).unwrap();
        value["secondary"][0][0]["appearance"] = serde_json::json!(40);

        let err = decode::<Session>(&value.to_string()).unwrap_err();
        assert!(matches!(err, TrailError::UnknownAppearance { id: 40 }));
        assert!(err.is_protocol_fault());
    }

    #[test]
    fn test_malformed_record() {
        let err = decode::<Session>("{\"map\": \"x\"").unwrap_err();
        assert!(matches!(err, TrailError::Decode(_)));

        let err = decode::<Session>("{\"map\":\"m\",\"room\":\"r\",\"registry\":{\"0\":{\"path\":\"p\",\"scale\":{\"x\":1.0,\"y\":1.0},\"rotation\":0.0,\"origin\":{\"x\":0.0,\"y\":0.0},\"color\":0}},\"primary\":[],\"secondary\":[]}").unwrap_err();
        assert!(err.is_protocol_fault());
    }

    #[test]
    fn test_decoded_registry_continues_ids() {
        let back: Session = decode(&encode(&sample_session()).unwrap()).unwrap();
        assert_eq!(back.registry.intern(&Appearance::new("new/sprite")).unwrap(), 4);
    }

    #[test]
    fn test_id_at_end_of_range_is_a_protocol_fault() {
        let mut value: serde_json::Value =
            serde_json::from_str(&encode(&sample_session()).unwrap()).unwrap();
        let registry = value["registry"].as_object_mut().unwrap();
        let descriptor = registry.remove("3").unwrap();
        registry.insert("4294967295".to_string(), descriptor);
        value["secondary"][0][0]["appearance"] = serde_json::json!(4294967295u32);

        let err = decode::<Session>(&value.to_string()).unwrap_err();
        assert!(err.is_protocol_fault());

        let descriptor = value["registry"]
            .as_object_mut()
            .unwrap()
            .remove("4294967295")
            .unwrap();
        value["registry"]["4294967294"] = descriptor;
        value["secondary"][0][0]["appearance"] = serde_json::json!(4294967294u32);
        let back: Session = decode(&value.to_string()).unwrap();
        assert!(back.registry.intern(&Appearance::new("new/sprite")).is_err());
    }

    #[test]
    fn test_non_finite_session_is_not_encoded() {
        let mut session = sample_session();
        let mut frames = session.primary.frames().to_vec();
        frames[0].pos = Vec2::new(f32::NAN, 1.0);
        session.primary = Track::from(frames);

        let mut buf = Vec::new();
        assert!(matches!(
            encode_into(&session, &mut buf),
            Err(TrailError::Encode(_))
        ));
        assert!(buf.is_empty());

        let mut session = sample_session();
        session
            .registry
            .intern(&Appearance::new("characters/player/spin00").with_rotation(f32::INFINITY))
            .unwrap();
        assert!(matches!(encode(&session), Err(TrailError::Encode(_))));
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = b"prefix".to_vec();
        encode_into(&sample_session(), &mut buf).unwrap();
        assert!(buf.starts_with(b"prefix{"));
        assert_eq!(buf.last(), Some(&RECORD_DELIMITER));
    }

    fn arb_vec2() -> impl Strategy<Value = Vec2> {
        (any::<f32>(), any::<f32>())
            .prop_filter("finite", |(x, y)| x.is_finite() && y.is_finite())
            .prop_map(|(x, y)| Vec2::new(x, y))
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            positions in proptest::collection::vec((arb_vec2(), any::<u32>(), 0usize..4), 0..30),
            rotations in proptest::collection::vec(-10.0f32..10.0, 1..4),
        ) {
            let registry = AppearanceRegistry::new();
            let ids: Vec<u32> = rotations
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    registry
                        .intern(&Appearance::new(format!("s{}", i)).with_rotation(*r))
                        .unwrap()
                })
                .collect();

            let mut session = Session::new(&RoomKey::new("m", "r"));
            session.registry = registry;
            for (i, (pos, color, which)) in positions.iter().enumerate() {
                session.primary.push(PrimaryFrame {
                    t: i as f64 / 7.5,
                    pos: *pos,
                    appearance: ids[which % ids.len()],
                    color: *color,
                    aux: *pos,
                });
            }

            let back: Session = decode(&encode(&session).unwrap()).unwrap();
            prop_assert_eq!(back, session);
        }
    }
}
