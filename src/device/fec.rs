/// Fitness Equipment (FE-C) page decoding: general data, general settings, trainer
/// specific data, and the trainer's acked command-status response.
use std::collections::HashMap;
use std::time::Instant;

use crate::device::{decode_common_page, TimeSeries};
use crate::message::bytes_to_u16;

const FEC_GENERAL: u8 = 0x10;
const FEC_GENERAL_SETTINGS: u8 = 0x11;
const FEC_TRAINER: u8 = 0x19;
const COMMON_STATUS: u8 = 0x47;

const CMD_RESISTANCE: u8 = 0x30;
const CMD_POWER: u8 = 0x31;

#[derive(Debug, Clone, Default)]
pub struct FecState {
    /// The command sequence number (payload[2] of the last `COMMON_STATUS` page
    /// seen), used to suppress duplicate `TRAINER_TARGET_*` samples until the
    /// trainer reports a new command.
    last_command_seq: Option<u8>,
}

impl FecState {
    pub fn decode(
        &mut self,
        payload: &[u8],
        metadata: &mut HashMap<String, f32>,
        time_series: &mut HashMap<String, TimeSeries>,
        ts: Instant,
    ) {
        if payload.is_empty() {
            return;
        }
        if decode_common_page(payload, metadata) {
            return;
        }
        if payload.len() < 8 {
            log::debug!("dropping short FE-C page: {:x?}", payload);
            return;
        }

        let mut push = |name: &str, value: f32| {
            time_series
                .entry(name.to_string())
                .or_insert_with(TimeSeries::new)
                .push(value, ts);
        };

        match payload[0] {
            FEC_GENERAL => {
                push(
                    "GENERAL_INST_SPEED",
                    bytes_to_u16(&payload[4..6]) as f32 * 0.001,
                );
            }
            FEC_GENERAL_SETTINGS => {
                push("SETTINGS_CYCLE_LENGTH", payload[3] as f32 * 0.01);
                let incline = bytes_to_u16(&payload[4..6]) as i16 as f32 * 0.01;
                push("SETTINGS_INCLINE", incline);
                push("SETTINGS_RESISTANCE", payload[6] as f32 * 0.5);
            }
            FEC_TRAINER => {
                push("TRAINER_CADENCE", payload[2] as f32);
                push("TRAINER_ACC_POWER", bytes_to_u16(&payload[3..5]) as f32);
                let inst_power = payload[5] as u16 | (((payload[6] & 0x0F) as u16) << 8);
                push("TRAINER_INST_POWER", inst_power as f32);
                push("TRAINER_STATUS", (payload[6] >> 4) as f32);
                push("TRAINER_FLAGS", (payload[7] & 0x0F) as f32);
            }
            COMMON_STATUS => {
                let seq = payload[2];
                let accepted = payload[3] == 0x00;
                if accepted && self.last_command_seq != Some(seq) {
                    self.last_command_seq = Some(seq);
                    match payload[1] {
                        CMD_RESISTANCE => {
                            push("TRAINER_TARGET_RESISTANCE", payload[7] as f32 * 0.5);
                        }
                        CMD_POWER => {
                            push(
                                "TRAINER_TARGET_POWER",
                                bytes_to_u16(&payload[6..8]) as f32 * 0.25,
                            );
                        }
                        other => log::debug!("unhandled FE-C command code {:#x}", other),
                    }
                }
            }
            _ => log::debug!("unknown FE-C page: {:x}", payload[0]),
        }
    }
}
