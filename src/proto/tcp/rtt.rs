//! Smoothed round-trip time estimation.

use crate::sim::SimTime;

use super::config::TcpConfig;

/// SRTT / RTTVAR estimator with the derived retransmission timeout.
///
/// Values are kept as floating-point nanoseconds so that the smoothing is
/// exact for millisecond-scale inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct RttEstimator {
    srtt: Option<f64>,
    rttvar: f64,
    rto: SimTime,
    min_rto: SimTime,
    max_rto: SimTime,
}

impl RttEstimator {
    pub const ALPHA: f64 = 0.125;
    pub const BETA: f64 = 0.25;

    /// The lower bound is never below 1 ns, so a timer always lies in the future.
    pub fn new(init_rto: SimTime, min_rto: SimTime, max_rto: SimTime) -> Self {
        let min_rto = min_rto.max(SimTime(1));
        let max_rto = max_rto.max(min_rto);
        Self {
            srtt: None,
            rttvar: 0.0,
            rto: init_rto.clamp(min_rto, max_rto),
            min_rto,
            max_rto,
        }
    }

    pub fn from_config(cfg: &TcpConfig) -> Self {
        Self::new(cfg.init_rto, cfg.min_rto, cfg.max_rto)
    }

    /// Feeds one round-trip sample and returns the new RTO.
    pub fn sample(&mut self, rtt: SimTime) -> SimTime {
        let r = rtt.0 as f64;
        let srtt = match self.srtt {
            None => {
                self.rttvar = r / 2.0;
                r
            }
            Some(srtt) => {
                // RTTVAR uses the SRTT from before this sample.
                self.rttvar = (1.0 - Self::BETA) * self.rttvar + Self::BETA * (srtt - r).abs();
                (1.0 - Self::ALPHA) * srtt + Self::ALPHA * r
            }
        };
        self.srtt = Some(srtt);
        self.rto = SimTime::from_nanos_f64(srtt + 4.0 * self.rttvar).clamp(self.min_rto, self.max_rto);
        self.rto
    }

    pub fn is_sampled(&self) -> bool {
        self.srtt.is_some()
    }

    pub fn srtt(&self) -> Option<SimTime> {
        self.srtt.map(SimTime::from_nanos_f64)
    }

    pub fn rttvar(&self) -> Option<SimTime> {
        self.srtt.map(|_| SimTime::from_nanos_f64(self.rttvar))
    }

    pub fn rto(&self) -> SimTime {
        self.rto
    }
}
