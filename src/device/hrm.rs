/// Heart rate monitor page decoding. Every broadcast page carries the current
/// heartrate; some pages additionally carry manufacturer/product metadata or the
/// previous beat time needed to compute an RR interval.
use std::collections::HashMap;
use std::time::Instant;

use crate::device::TimeSeries;
use crate::message::bytes_to_u16;

const HR_INFO: u8 = 0x02;
const HR_MF_INFO: u8 = 0x03;
const HR_PREVIOUS: u8 = 0x04;
const TOGGLE_BIT: u8 = 0x80;
const TOGGLE_SENTINEL: u8 = 0xFF;

/// `1000.0 / 1024.0`: a 1/1024 s tick expressed in milliseconds.
const RR_TICK_MS: f32 = 1000.0 / 1024.0;

#[derive(Debug, Clone, Default)]
pub struct HrState {
    prior_toggle: Option<u8>,
    toggled: bool,
}

impl HrState {
    pub fn toggled(&self) -> bool {
        self.toggled
    }

    pub fn decode(
        &mut self,
        payload: &[u8],
        metadata: &mut HashMap<String, f32>,
        time_series: &mut HashMap<String, TimeSeries>,
        ts: Instant,
    ) {
        if payload.len() < 8 {
            log::debug!("dropping short HR page: {:x?}", payload);
            return;
        }

        let toggle_bit = payload[0] & TOGGLE_BIT;
        if let Some(prior) = self.prior_toggle {
            if prior != TOGGLE_SENTINEL && prior != toggle_bit {
                self.toggled = true;
            }
        }
        self.prior_toggle = Some(toggle_bit);

        let page = payload[0] & 0x7F;
        match page {
            HR_INFO => {
                metadata.insert("MANUFACTURER_ID".into(), payload[1] as f32);
                metadata.insert("SERIAL_NUMBER".into(), bytes_to_u16(&payload[2..4]) as f32);
            }
            HR_MF_INFO => {
                metadata.insert("HW_REVISION".into(), payload[1] as f32);
                metadata.insert("SW_VERSION".into(), payload[2] as f32);
                metadata.insert("MODEL_NUMBER".into(), payload[3] as f32);
            }
            HR_PREVIOUS => {
                let hb_event_time = bytes_to_u16(&payload[4..6]);
                let previous_hb_event_time = bytes_to_u16(&payload[2..4]);
                let rr_interval =
                    (hb_event_time as f32 - previous_hb_event_time as f32) * RR_TICK_MS;
                time_series
                    .entry("RR_INTERVAL".into())
                    .or_insert_with(TimeSeries::new)
                    .push(rr_interval, ts);
            }
            _ => {}
        }

        time_series
            .entry("HEARTRATE".into())
            .or_insert_with(TimeSeries::new)
            .push(payload[7] as f32, ts);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hr_previous_page(hb_event_time: u16, previous: u16, heartrate: u8) -> Vec<u8> {
        vec![
            HR_PREVIOUS,
            0,
            (previous & 0xFF) as u8,
            ((previous >> 8) & 0xFF) as u8,
            (hb_event_time & 0xFF) as u8,
            ((hb_event_time >> 8) & 0xFF) as u8,
            0,
            heartrate,
        ]
    }

    #[test]
    fn heartrate_is_always_emitted() {
        let mut state = HrState::default();
        let mut metadata = HashMap::new();
        let mut time_series = HashMap::new();
        let payload = vec![0x00, 0, 0, 0, 0, 0, 0, 72];
        state.decode(&payload, &mut metadata, &mut time_series, Instant::now());
        assert_eq!(time_series["HEARTRATE"].latest().unwrap().0, 72.0);
    }

    #[test]
    fn rr_interval_matches_expected_ms() {
        let mut state = HrState::default();
        let mut metadata = HashMap::new();
        let mut time_series = HashMap::new();
        let now = Instant::now();

        state.decode(&hr_previous_page(2048, 1024, 60), &mut metadata, &mut time_series, now);
        state.decode(&hr_previous_page(3072, 2048, 61), &mut metadata, &mut time_series, now);

        let samples: Vec<f32> = time_series["RR_INTERVAL"].values().collect();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 1000.0).abs() < 1e-3);
        assert!((samples[1] - 1000.0).abs() < 1e-3);
    }

    #[test]
    fn manufacturer_info_page_sets_metadata() {
        let mut state = HrState::default();
        let mut metadata = HashMap::new();
        let mut time_series = HashMap::new();
        let payload = vec![HR_INFO, 32, 0x01, 0x00, 0, 0, 0, 60];
        state.decode(&payload, &mut metadata, &mut time_series, Instant::now());
        assert_eq!(metadata["MANUFACTURER_ID"], 32.0);
        assert_eq!(metadata["SERIAL_NUMBER"], 1.0);
    }

    #[test]
    fn toggle_change_sets_toggled_flag() {
        let mut state = HrState::default();
        let mut metadata = HashMap::new();
        let mut time_series = HashMap::new();
        state.decode(&[0x00, 0, 0, 0, 0, 0, 0, 60], &mut metadata, &mut time_series, Instant::now());
        assert!(!state.toggled());
        state.decode(&[0x80, 0, 0, 0, 0, 0, 0, 61], &mut metadata, &mut time_series, Instant::now());
        assert!(state.toggled());
    }
}
