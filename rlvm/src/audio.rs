//! Named music and sound-effect records materialised from the Gameexe.
//!
//! Grounded on `original_source/src/core/audio_table.cpp`. Opcodes that
//! play music or sound effects consult this table by name/number rather
//! than touching the Gameexe directly; it is the one piece of state the
//! machine hands to the (externally supplied) audio backend.

use std::collections::HashMap;

use rlvm_types::Result;

use crate::gameexe::Gameexe;

/// A disk- or looped-track-backed background music definition (`#DSTRACK`
/// / `#BGM.xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DsTrack {
    /// The track's lookup name, lowercased.
    pub name: String,
    /// The backing audio file's stem (resolved later through
    /// [`crate::assets::AssetIndex`]).
    pub file: String,
    /// Loop-region start, in samples.
    pub from: i32,
    /// Loop-region end, in samples.
    pub to: i32,
    /// Loop point to return to at `to`.
    pub r#loop: i32,
}

/// A CD-audio-track-backed background music definition (`#CDTRACK`).
/// Playback is out of scope for this core (see spec.md Non-goals); the
/// record is still indexed so lookups can report "not supported" rather
/// than "not found".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CdTrack {
    /// The track's lookup name, lowercased.
    pub name: String,
    /// Loop-region start, in CD frames.
    pub from: i32,
    /// Loop-region end, in CD frames.
    pub to: i32,
    /// Loop point to return to at `to`.
    pub r#loop: i32,
}

/// A sound-effect definition (`#SE.xxx`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeTrack {
    /// Backing audio file stem.
    pub file: String,
    /// Target output channel, or `-1` for "unspecified".
    pub channel: i32,
}

/// The music/SE tables read out of a Gameexe.
#[derive(Debug, Default)]
pub struct AudioTable {
    se_table: HashMap<i32, SeTrack>,
    ds_tracks: HashMap<String, DsTrack>,
    cd_tracks: HashMap<String, CdTrack>,
}

impl AudioTable {
    /// Build the table by reading `#SE.xxx`, `#DSTRACK`, `#CDTRACK`, and
    /// `#BGM.xxx` entries out of `gexe`. Malformed entries are skipped
    /// (matching the original's `continue`-on-missing-field behaviour)
    /// rather than failing the whole load.
    pub fn from_gameexe(gexe: &Gameexe) -> Self {
        let mut table = AudioTable::default();

        for se in gexe.filter("SE.") {
            let parts = se.key_parts();
            let Some(raw_number) = parts.get(1) else {
                continue;
            };
            let Ok(entry_number) = raw_number.parse::<i32>() else {
                continue;
            };
            let Ok(file) = se.at(0).map(|t| t.to_string_value()) else {
                continue;
            };
            let channel = se.at(1).map(|t| t.to_int()).unwrap_or(-1);
            table
                .se_table
                .insert(entry_number, SeTrack { file, channel });
        }

        for dstrack in gexe.filter("DSTRACK") {
            let Ok(from) = dstrack.at(0).map(|t| t.to_int()) else {
                continue;
            };
            let Ok(to) = dstrack.at(1).map(|t| t.to_int()) else {
                continue;
            };
            let Ok(loop_) = dstrack.at(2).map(|t| t.to_int()) else {
                continue;
            };
            let Ok(file) = dstrack.at(3).map(|t| t.to_string_value()) else {
                continue;
            };
            let Ok(name) = dstrack.at(4).map(|t| t.to_string_value()) else {
                continue;
            };
            let name = name.to_lowercase();
            table.ds_tracks.insert(
                name.clone(),
                DsTrack {
                    name,
                    file,
                    from,
                    to,
                    r#loop: loop_,
                },
            );
        }

        for cdtrack in gexe.filter("CDTRACK") {
            let Ok(from) = cdtrack.at(0).map(|t| t.to_int()) else {
                continue;
            };
            let Ok(to) = cdtrack.at(1).map(|t| t.to_int()) else {
                continue;
            };
            let Ok(loop_) = cdtrack.at(2).map(|t| t.to_int()) else {
                continue;
            };
            let Ok(name) = cdtrack.at(3).map(|t| t.to_string_value()) else {
                continue;
            };
            let name = name.to_lowercase();
            table.cd_tracks.insert(
                name.clone(),
                CdTrack {
                    name,
                    from,
                    to,
                    r#loop: loop_,
                },
            );
        }

        for bgm in gexe.filter("BGM") {
            let Ok(name) = bgm.at(0).map(|t| t.to_string_value()) else {
                continue;
            };
            let Ok(file) = bgm.at(1).map(|t| t.to_string_value()) else {
                continue;
            };
            let Ok(from) = bgm.at(2).map(|t| t.to_int()) else {
                continue;
            };
            let Ok(to) = bgm.at(3).map(|t| t.to_int()) else {
                continue;
            };
            let Ok(loop_) = bgm.at(4).map(|t| t.to_int()) else {
                continue;
            };
            let name = name.to_lowercase();
            table.ds_tracks.insert(
                name.clone(),
                DsTrack {
                    name,
                    file,
                    from,
                    to,
                    r#loop: loop_,
                },
            );
        }

        table
    }

    /// Resolve a BGM name to its disk-backed track, erroring out (not
    /// panicking) if it resolves to a CD track, which this core does not
    /// play.
    pub fn find_bgm(&self, bgm_name: &str) -> Result<DsTrack> {
        let name = bgm_name.to_lowercase();
        if let Some(track) = self.ds_tracks.get(&name) {
            return Ok(track.clone());
        }
        if self.cd_tracks.contains_key(&name) {
            return Err(rlvm_types::Error::NotFound(format!(
                "CD music not supported: \"{bgm_name}\""
            )));
        }
        Err(rlvm_types::Error::NotFound(format!(
            "music track \"{bgm_name}\""
        )))
    }

    /// Resolve a sound-effect channel number to its definition.
    pub fn find_se(&self, se_num: i32) -> Result<&SeTrack> {
        self.se_table
            .get(&se_num)
            .ok_or_else(|| rlvm_types::Error::NotFound(format!("SE entry {se_num}")))
    }
}
