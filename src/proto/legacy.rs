/* This file is part of fromage
 *
 * Copyright (C) 2020-2026 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Legacy packets.
//!
//! These are from an older time and are of a different format from
//! sane packets: the body is a list of ASCII string components split on
//! `\x01`, with the first component holding the two-code-point ID.

pub use clientbound::ClientboundLegacy;
pub use serverbound::ServerboundLegacy;

pub mod serverbound {
    use crate::{
        error::Result,
        proto::packet::{define_legacy_packets, legacy_component, LegacyBody},
    };

    define_legacy_packets! {
        pub enum ServerboundLegacy {
            AddAnchors,
            MapEditorXml,
            ReturnToMapEditor,
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct AddAnchors {
        /// Raw anchor descriptions.
        pub anchors: Vec<String>,
    }

    impl LegacyBody for AddAnchors {
        const ID: (u8, u8) = (5, 7);

        fn from_components(components: &[&str]) -> Result<Self> {
            Ok(Self { anchors: components.iter().map(|c| c.to_string()).collect() })
        }

        fn components(&self) -> Vec<String> {
            self.anchors.clone()
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct MapEditorXml {
        pub xml: String,
    }

    impl LegacyBody for MapEditorXml {
        const ID: (u8, u8) = (14, 10);

        fn from_components(components: &[&str]) -> Result<Self> {
            Ok(Self { xml: legacy_component(components, 0)? })
        }

        fn components(&self) -> Vec<String> {
            vec![self.xml.clone()]
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct ReturnToMapEditor;

    impl LegacyBody for ReturnToMapEditor {
        const ID: (u8, u8) = (14, 14);

        fn from_components(_components: &[&str]) -> Result<Self> {
            Ok(Self)
        }

        fn components(&self) -> Vec<String> {
            vec![]
        }
    }
}

pub mod clientbound {
    use crate::{
        error::Result,
        proto::{
            enums::{DeathType, ExplosionParticles},
            packet::{define_legacy_packets, legacy_component, LegacyBody},
        },
        wire::WireEnum,
    };

    define_legacy_packets! {
        pub enum ClientboundLegacy {
            RemoveExplodedObject,
            AddAnchors,
            SyncExplosion,
            PlayerDied,
            SetSynchronizer,
            BanMessage,
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct RemoveExplodedObject {
        pub object_id: i32,
    }

    impl LegacyBody for RemoveExplodedObject {
        const ID: (u8, u8) = (4, 6);

        fn from_components(components: &[&str]) -> Result<Self> {
            Ok(Self { object_id: legacy_component(components, 0)? })
        }

        fn components(&self) -> Vec<String> {
            vec![self.object_id.to_string()]
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct AddAnchors {
        /// Raw anchor descriptions.
        pub anchors: Vec<String>,
    }

    impl LegacyBody for AddAnchors {
        const ID: (u8, u8) = (5, 7);

        fn from_components(components: &[&str]) -> Result<Self> {
            Ok(Self { anchors: components.iter().map(|c| c.to_string()).collect() })
        }

        fn components(&self) -> Vec<String> {
            self.anchors.clone()
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct SyncExplosion {
        pub x: i32,
        pub y: i32,
        pub power: i32,
        pub radius: i32,
        pub affect_objects: bool,
        pub particles: ExplosionParticles,
    }

    impl LegacyBody for SyncExplosion {
        const ID: (u8, u8) = (5, 17);

        fn from_components(components: &[&str]) -> Result<Self> {
            Ok(Self {
                x: legacy_component(components, 0)?,
                y: legacy_component(components, 1)?,
                power: legacy_component(components, 2)?,
                radius: legacy_component(components, 3)?,
                affect_objects: components.get(4) == Some(&"1"),
                particles: ExplosionParticles::from_repr(legacy_component(components, 5)?)
                    .unwrap_or(ExplosionParticles::None),
            })
        }

        fn components(&self) -> Vec<String> {
            vec![
                self.x.to_string(),
                self.y.to_string(),
                self.power.to_string(),
                self.radius.to_string(),
                if self.affect_objects { "1" } else { "0" }.to_string(),
                self.particles.to_repr().to_string(),
            ]
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct PlayerDied {
        pub session_id: i32,
        // Per-round death counter?
        pub unk_attr_2: i32,
        pub score: i32,
        pub death_type: DeathType,
    }

    impl LegacyBody for PlayerDied {
        const ID: (u8, u8) = (8, 5);

        fn from_components(components: &[&str]) -> Result<Self> {
            Ok(Self {
                session_id: legacy_component(components, 0)?,
                unk_attr_2: legacy_component(components, 1)?,
                score: legacy_component(components, 2)?,
                death_type: DeathType::from_repr(legacy_component(components, 3)?)
                    .unwrap_or(DeathType::Normal),
            })
        }

        fn components(&self) -> Vec<String> {
            vec![
                self.session_id.to_string(),
                self.unk_attr_2.to_string(),
                self.score.to_string(),
                self.death_type.to_repr().to_string(),
            ]
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct SetSynchronizer {
        pub session_id: i32,
        pub spawn_initial_objects: bool,
    }

    impl LegacyBody for SetSynchronizer {
        const ID: (u8, u8) = (8, 21);

        fn from_components(components: &[&str]) -> Result<Self> {
            Ok(Self {
                session_id: legacy_component(components, 0)?,
                spawn_initial_objects: components.len() == 2,
            })
        }

        fn components(&self) -> Vec<String> {
            if self.spawn_initial_objects {
                return vec![self.session_id.to_string(), String::new()]
            }

            vec![self.session_id.to_string()]
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct BanMessage {
        pub reason_template: String,
        /// Milliseconds; `None` for a permanent ban.
        pub duration: Option<i64>,
    }

    impl BanMessage {
        pub fn is_permanent(&self) -> bool {
            self.duration.is_none()
        }
    }

    impl LegacyBody for BanMessage {
        const ID: (u8, u8) = (26, 18);

        fn from_components(components: &[&str]) -> Result<Self> {
            if components.len() < 2 {
                return Ok(Self {
                    reason_template: legacy_component(components, 0)?,
                    duration: None,
                })
            }

            Ok(Self {
                reason_template: legacy_component(components, 1)?,
                duration: Some(legacy_component(components, 0)?),
            })
        }

        fn components(&self) -> Vec<String> {
            match self.duration {
                None => vec![self.reason_template.clone()],
                Some(duration) => vec![duration.to_string(), self.reason_template.clone()],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        proto::packet::{LegacyBody, UnknownLegacy},
        wire::{deserialize, serialize, Ctx},
    };

    #[test]
    fn joined_string_layout() {
        let ctx = Ctx::default();

        let died = ClientboundLegacy::PlayerDied(clientbound::PlayerDied {
            session_id: 77,
            unk_attr_2: 1,
            score: 12,
            death_type: crate::proto::enums::DeathType::Normal,
        });

        let data = serialize(&died, &ctx);
        // u16 length, then id code points (8, 5), then components.
        assert_eq!(&data[2..4], &[8, 5]);
        assert_eq!(&data[4..], b"\x0177\x011\x0112\x010");
        assert_eq!(deserialize::<ClientboundLegacy>(&data, &ctx).unwrap(), died);
    }

    #[test]
    fn unknown_legacy_round_trips() {
        let ctx = Ctx::default();

        let packet = ClientboundLegacy::Unknown(UnknownLegacy {
            id: (0, 0),
            components: vec![],
        });

        let data = serialize(&packet, &ctx);
        // The empty packet is just the two NUL id code points.
        assert_eq!(data, vec![0, 2, 0, 0]);
        assert_eq!(deserialize::<ClientboundLegacy>(&data, &ctx).unwrap(), packet);
    }

    #[test]
    fn short_legacy_id_is_malformed() {
        let ctx = Ctx::default();

        // A one-code-point first component cannot hold an ID.
        assert!(deserialize::<ClientboundLegacy>(&[0, 1, 0x41], &ctx).is_err());
    }

    #[test]
    fn ban_message_forms() {
        let permanent =
            clientbound::BanMessage::from_components(&["hacking"]).unwrap();
        assert!(permanent.is_permanent());
        assert_eq!(permanent.components(), vec!["hacking".to_string()]);

        let timed = clientbound::BanMessage::from_components(&["3600000", "spam"]).unwrap();
        assert_eq!(timed.duration, Some(3_600_000));
        assert_eq!(timed.components(), vec!["3600000".to_string(), "spam".to_string()]);
    }

    #[test]
    fn synchronizer_trailing_component() {
        let with_spawn = clientbound::SetSynchronizer::from_components(&["5", ""]).unwrap();
        assert!(with_spawn.spawn_initial_objects);

        let without = clientbound::SetSynchronizer::from_components(&["5"]).unwrap();
        assert!(!without.spawn_initial_objects);
        assert_eq!(without.components(), vec!["5".to_string()]);
    }

    #[test]
    fn serverbound_map_editor_roundtrip() {
        let ctx = Ctx::default();

        let xml = ServerboundLegacy::MapEditorXml(serverbound::MapEditorXml {
            xml: "<C></C>".to_string(),
        });
        let data = serialize(&xml, &ctx);
        assert_eq!(deserialize::<ServerboundLegacy>(&data, &ctx).unwrap(), xml);
    }
}
