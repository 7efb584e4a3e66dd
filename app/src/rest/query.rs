use chrono::NaiveDate;

/// `?date=YYYY-MM-DD`, today when absent
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct DateQuery {
    date: Option<NaiveDate>,
}

impl DateQuery {
    pub fn date_or(&self, today: NaiveDate) -> NaiveDate {
        self.date.unwrap_or(today)
    }
}
