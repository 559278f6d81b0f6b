/// Power meter page decoding: standard power/balance/cadence, torque-effectiveness/
/// pedal-smoothness, battery status, and crank/torque configuration parameters.
use std::collections::HashMap;
use std::time::Instant;

use crate::device::{decode_common_page, TimeSeries};
use crate::message::bytes_to_u32;

const POWER_PARAMS: u8 = 0x02;
const POWER_STANDARD: u8 = 0x10;
const POWER_TEPS: u8 = 0x13;
const POWER_BATTERY: u8 = 0x52;

const SUBPAGE_CRANK: u8 = 0x01;
const SUBPAGE_TORQUE: u8 = 0x02;

#[derive(Debug, Clone, Default)]
pub struct PowerState;

impl PowerState {
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
            log::debug!("dropping short power page: {:x?}", payload);
            return;
        }

        let mut push = |name: &str, value: f32| {
            time_series
                .entry(name.to_string())
                .or_insert_with(TimeSeries::new)
                .push(value, ts);
        };

        match payload[0] {
            POWER_STANDARD => {
                if payload[2] & 0x80 != 0 && payload[2] != 0xFF {
                    push("BALANCE", (payload[2] & 0x7F) as f32);
                }
                push("CADENCE", payload[3] as f32);
                push("ACC_POWER", bytes_to_u32(&payload[4..6]) as f32);
                push("INST_POWER", bytes_to_u32(&payload[6..8]) as f32);
            }
            POWER_TEPS => {
                push("LEFT_TE", payload[2] as f32 * 0.5);
                push("RIGHT_TE", payload[3] as f32 * 0.5);
                push("LEFT_PS", payload[4] as f32 * 0.5);
                push("RIGHT_PS", payload[5] as f32 * 0.5);
            }
            POWER_BATTERY => {
                push("N_BATTERIES", (payload[2] & 0x0F) as f32);
                push("OPERATING_TIME", bytes_to_u32(&payload[3..6]) as f32);
                push("BATTERY_VOLTAGE", payload[6] as f32 / 256.0);
            }
            POWER_PARAMS => match payload[1] {
                SUBPAGE_CRANK => {
                    push("CRANK_LENGTH", payload[4] as f32 * 0.5 + 110.0);
                    push("CRANK_STATUS", (payload[5] & 0x03) as f32);
                    push("SENSOR_STATUS", ((payload[6] >> 3) & 0x01) as f32);
                }
                SUBPAGE_TORQUE => {
                    push("PEAK_TORQUE_THRESHOLD", payload[7] as f32 * 0.5);
                }
                _ => log::debug!("unknown power params sub-page: {:x}", payload[1]),
            },
            _ => log::debug!("unknown power page: {:x}", payload[0]),
        }
    }
}
