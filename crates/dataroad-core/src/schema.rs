//! Canonical column names shared by the loader, the joiner and the dashboard.

/// Join key every source is renamed to after load.
pub const KEY_COLUMN: &str = "cod_municipio";
pub const TOTAL_VEHICLES_COLUMN: &str = "total_veiculos";
pub const POPULATION_COLUMN: &str = "populacao";
pub const PER_CAPITA_COLUMN: &str = "frota_per_capita";
pub const TRANSPORT_DEATHS_COLUMN: &str = "obitos_transporte";
pub const YEAR_COLUMN: &str = "ano";
pub const STATE_COLUMN: &str = "uf";

/// Suffix for population columns whose names already exist in the fleet table.
pub const POPULATION_SUFFIX: &str = "_pop";

/// Columns the dashboard reads from the analytic table.
pub const DASHBOARD_COLUMNS: [&str; 5] = [
    YEAR_COLUMN,
    STATE_COLUMN,
    PER_CAPITA_COLUMN,
    POPULATION_COLUMN,
    TOTAL_VEHICLES_COLUMN,
];
