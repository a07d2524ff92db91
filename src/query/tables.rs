//! Allow-listed tables and columns, grouped into families that share
//! filter, time and aggregation rules.

use shared::AppError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTable {
    CoronavirusDaily,
    Coronavirus2020,
    Coronavirus2021,
    Coronavirus2022,
    Coronavirus2023,
    Covid19Vaccine,
    WorldPopulation,
}

impl DataTable {
    pub const ALL: [DataTable; 7] = [
        DataTable::CoronavirusDaily,
        DataTable::Coronavirus2020,
        DataTable::Coronavirus2021,
        DataTable::Coronavirus2022,
        DataTable::Coronavirus2023,
        DataTable::Covid19Vaccine,
        DataTable::WorldPopulation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataTable::CoronavirusDaily => "coronavirus_daily",
            DataTable::Coronavirus2020 => "coronavirus_2020",
            DataTable::Coronavirus2021 => "coronavirus_2021",
            DataTable::Coronavirus2022 => "coronavirus_2022",
            DataTable::Coronavirus2023 => "coronavirus_2023",
            DataTable::Covid19Vaccine => "covid19_vaccine",
            DataTable::WorldPopulation => "world_population",
        }
    }

    pub fn family(self) -> TableFamily {
        match self {
            DataTable::CoronavirusDaily
            | DataTable::Coronavirus2020
            | DataTable::Coronavirus2021
            | DataTable::Coronavirus2022
            | DataTable::Coronavirus2023 => TableFamily::DailyTimeSeries,
            DataTable::Covid19Vaccine => TableFamily::Vaccinations,
            DataTable::WorldPopulation => TableFamily::Population,
        }
    }
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataTable {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataTable::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown table '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateColumn {
    Cases,
    DosesAdmin,
    PeopleAtLeastOneDose,
    Population,
}

impl AggregateColumn {
    pub const ALL: [AggregateColumn; 4] = [
        AggregateColumn::Cases,
        AggregateColumn::DosesAdmin,
        AggregateColumn::PeopleAtLeastOneDose,
        AggregateColumn::Population,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateColumn::Cases => "cases",
            AggregateColumn::DosesAdmin => "doses_admin",
            AggregateColumn::PeopleAtLeastOneDose => "people_at_least_one_dose",
            AggregateColumn::Population => "population",
        }
    }
}

impl fmt::Display for AggregateColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateColumn {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateColumn::ALL
            .into_iter()
            .find(|column| column.as_str() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown column '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFamily {
    /// `coronavirus_*`: one row per country, date and record type.
    DailyTimeSeries,
    Vaccinations,
    Population,
}

impl TableFamily {
    pub fn country_column(self) -> &'static str {
        match self {
            TableFamily::DailyTimeSeries => "country",
            TableFamily::Vaccinations => "country_region",
            TableFamily::Population => "country_name",
        }
    }

    pub fn time_column(self) -> &'static str {
        match self {
            TableFamily::DailyTimeSeries | TableFamily::Vaccinations => "date",
            TableFamily::Population => "year",
        }
    }

    pub fn columns(self) -> &'static [AggregateColumn] {
        match self {
            TableFamily::DailyTimeSeries => &[AggregateColumn::Cases],
            TableFamily::Vaccinations => {
                &[AggregateColumn::DosesAdmin, AggregateColumn::PeopleAtLeastOneDose]
            }
            TableFamily::Population => &[AggregateColumn::Population],
        }
    }

    /// Whether aggregate queries sum per time bucket instead of returning raw rows.
    pub fn sums_per_time_bucket(self) -> bool {
        matches!(self, TableFamily::DailyTimeSeries)
    }

    pub fn has_column(self, column: AggregateColumn) -> bool {
        self.columns().contains(&column)
    }
}
