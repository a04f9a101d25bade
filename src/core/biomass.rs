use serde::{Deserialize, Serialize};

/// Derived vegetation stock estimates for a single NDVI value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiomassEstimate {
    /// Above-ground biomass proxy, kg/ha
    pub biomass: f64,
    /// Carbon stock, kg/ha
    pub carbon: f64,
    /// CO2 equivalent, kg/ha
    pub co2: f64,
}

/// Strategy turning a normalized NDVI into biomass/carbon/CO2 estimates
///
/// The aggregation loop never hardcodes a formula; swapping the model swaps
/// every derived column of the result table.
pub trait BiomassModel: Send + Sync {
    /// Estimate stocks from a normalized index value, without branching on
    /// its sign
    fn estimate(&self, ndvi_normalized: f64) -> BiomassEstimate;

    /// Short model identifier for logs
    fn name(&self) -> &str;
}

/// Fixed linear proxy model
///
/// `biomass = biomass_per_ndvi × NDVI`, `carbon = carbon_fraction × biomass`,
/// `co2 = co2_per_carbon × carbon`. Not calibrated per ecosystem; callers
/// needing scientific accuracy should supply their own allometric model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearBiomassModel {
    /// Biomass attributed per unit of NDVI, kg/ha
    pub biomass_per_ndvi: f64,
    /// Carbon mass fraction of dry biomass
    pub carbon_fraction: f64,
    /// CO2-to-carbon mass ratio (44/12)
    pub co2_per_carbon: f64,
}

impl Default for LinearBiomassModel {
    fn default() -> Self {
        Self {
            biomass_per_ndvi: 10_000.0,
            carbon_fraction: 0.5,
            co2_per_carbon: 3.67,
        }
    }
}

impl BiomassModel for LinearBiomassModel {
    fn estimate(&self, ndvi_normalized: f64) -> BiomassEstimate {
        let biomass = self.biomass_per_ndvi * ndvi_normalized;
        let carbon = self.carbon_fraction * biomass;
        let co2 = self.co2_per_carbon * carbon;
        BiomassEstimate {
            biomass,
            carbon,
            co2,
        }
    }

    fn name(&self) -> &str {
        "linear-proxy"
    }
}
