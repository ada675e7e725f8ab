use polars::prelude::*;

use crate::schema::PER_CAPITA_COLUMN;

/// Vehicles per resident. Undefined (null) for missing inputs, non-positive
/// population and non-finite results.
pub fn fleet_per_capita(total_vehicles: Option<f64>, population: Option<f64>) -> Option<f64> {
    let total = total_vehicles?;
    let population = population?;
    if population <= 0.0 {
        return None;
    }
    let ratio = total / population;
    ratio.is_finite().then_some(ratio)
}

/// Adds [`PER_CAPITA_COLUMN`], replacing a column of that name if `df` already has one.
pub fn apply_fleet_per_capita(
    df: &DataFrame,
    total_column: &str,
    population_column: &str,
) -> Result<DataFrame, PolarsError> {
    let len = df.height();

    let totals = df.column(total_column)?.cast(&DataType::Float64)?;
    let totals = totals.f64()?;
    let population = df.column(population_column)?.cast(&DataType::Float64)?;
    let population = population.f64()?;

    let mut per_capita = Vec::with_capacity(len);
    for idx in 0..len {
        per_capita.push(fleet_per_capita(totals.get(idx), population.get(idx)));
    }

    let mut output = df.clone();
    output.with_column(Series::new(PER_CAPITA_COLUMN.into(), per_capita))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_ratios_are_null() {
        assert_eq!(fleet_per_capita(Some(10.0), Some(5.0)), Some(2.0));
        assert_eq!(fleet_per_capita(Some(10.0), Some(0.0)), None);
        assert_eq!(fleet_per_capita(Some(10.0), Some(-3.0)), None);
        assert_eq!(fleet_per_capita(None, Some(5.0)), None);
        assert_eq!(fleet_per_capita(Some(10.0), None), None);
        assert_eq!(fleet_per_capita(Some(f64::INFINITY), Some(5.0)), None);
        assert_eq!(fleet_per_capita(Some(f64::NAN), Some(5.0)), None);
    }

    #[test]
    fn existing_per_capita_column_is_recomputed_in_place() -> PolarsResult<()> {
        let df = df!(
            "cod_municipio" => &["001", "002"],
            "frota_per_capita" => &["stale", "stale"],
            "total_veiculos" => &[Some(100i64), Some(10)],
            "populacao" => &[Some(50i64), None],
        )?;

        let output = apply_fleet_per_capita(&df, "total_veiculos", "populacao")?;

        assert_eq!(output.width(), 4);
        assert_eq!(output.get_column_names()[1].as_str(), PER_CAPITA_COLUMN);
        let per_capita = output.column(PER_CAPITA_COLUMN)?.f64()?;
        assert_eq!(per_capita.get(0), Some(2.0));
        assert_eq!(per_capita.get(1), None);
        Ok(())
    }
}
