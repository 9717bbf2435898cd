use chrono::Local;
use weatherboard_core::{Coordinate, Snapshot, UnitPreference, WeatherEntry};

pub fn print_list(snapshot: &Snapshot) {
    if snapshot.entries.is_empty() {
        println!("Nothing to show yet. Add a city with `weatherboard add`.");
        return;
    }

    for (index, entry) in snapshot.entries.iter().enumerate() {
        let current = index == 0 && snapshot.has_current_entry;
        println!("{}", format_row(index, entry, snapshot.unit, current));
    }
}

pub fn format_row(
    index: usize,
    entry: &WeatherEntry,
    unit: UnitPreference,
    current: bool,
) -> String {
    let m = &entry.record.measurements;
    let marker = if current { "*" } else { " " };

    format!(
        "{index:>2} {marker} {:<28} {:>6.1}{}  {}  (updated {})",
        entry.record.place_name,
        unit.convert(m.temperature_c),
        unit.symbol(),
        m.condition,
        m.observation_time.with_timezone(&Local).format("%H:%M"),
    )
}

pub fn print_cities(cities: &[Coordinate]) {
    if cities.is_empty() {
        println!("No saved cities.");
        return;
    }

    for (index, city) in cities.iter().enumerate() {
        println!("{index:>2}  {city}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use weatherboard_core::{GeoPoint, Measurements, WeatherRecord};

    fn busan() -> WeatherEntry {
        WeatherEntry {
            requested: Coordinate::new(35.0, 129.0),
            record: WeatherRecord {
                provider: "openweather".into(),
                place_name: "Busan".into(),
                coord: GeoPoint::new(35.1, 129.04),
                measurements: Measurements {
                    temperature_c: 20.0,
                    feels_like_c: 19.0,
                    condition: "light rain".into(),
                    humidity_pct: 80,
                    wind_speed_mps: 4.0,
                    observation_time: Utc::now(),
                },
            },
        }
    }

    #[test]
    fn row_uses_the_selected_unit() {
        let row = format_row(1, &busan(), UnitPreference::Fahrenheit, false);
        assert!(row.contains("Busan"));
        assert!(row.contains("68.0°F"), "unexpected row: {row}");
        assert!(row.contains("light rain"));

        let row = format_row(1, &busan(), UnitPreference::Celsius, false);
        assert!(row.contains("20.0°C"), "unexpected row: {row}");
    }

    #[test]
    fn current_location_row_is_marked() {
        let row = format_row(0, &busan(), UnitPreference::Celsius, true);
        assert!(row.starts_with(" 0 * "), "unexpected row: {row}");
    }
}
