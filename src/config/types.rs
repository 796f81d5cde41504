use serde::{Deserialize, Serialize};

/**
 * The noise band used to classify a pressure diff. A diff with an absolute
 * value below `noise_floor` is sensor jitter, above `noise_ceiling` it is a
 * non-rep artifact such as the device being repositioned; everything in
 * between counts as genuine vertical movement. The defaults reproduce the
 * behavior observed with the DPS310 sensor, but they are a tuning
 * parameter, not a physical law.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorTuning {
    pub noise_floor: i64,
    pub noise_ceiling: i64,
}

impl Default for DetectorTuning {
    fn default() -> Self {
        DetectorTuning {
            noise_floor: 1,
            noise_ceiling: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub tuning: DetectorTuning,
}
