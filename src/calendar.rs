//! Month grids and the date / date-range picker state machines.

use chrono::{Datelike, Months, NaiveDate};
use rocket::serde::json::Json;
use rocket::{get, post, routes, Route};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some(next.signed_duration_since(first).num_days() as u32)
}

/// One month laid out in Monday-first weeks. Cells outside the month are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<[Option<NaiveDate>; 7]>,
}

impl CalendarMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let days = days_in_month(year, month)?;
        let mut weeks = Vec::new();
        let mut week = [None; 7];
        let mut column = first.weekday().num_days_from_monday() as usize;

        for day in first.iter_days().take(days as usize) {
            week[column] = Some(day);
            column += 1;
            if column == 7 {
                weeks.push(week);
                week = [None; 7];
                column = 0;
            }
        }
        if column > 0 {
            weeks.push(week);
        }
        Some(Self { year, month, weeks })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Overlay {
    None,
    YearPicker,
    MonthPicker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum DateEvent {
    Open,
    Close,
    ToggleYearPicker,
    ToggleMonthPicker,
    ChooseYear(i32),
    ChooseMonth(u32),
    PrevMonth,
    NextMonth,
    SelectDay(NaiveDate),
}

/// Single-date picker: displayed month, committed date and the overlay shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatePicker {
    year: i32,
    month: u32,
    selected: Option<NaiveDate>,
    overlay: Overlay,
    open: bool,
}

impl DatePicker {
    /// Picker showing the month of `selected`, or of `today` when nothing is committed.
    pub fn new(today: NaiveDate, selected: Option<NaiveDate>) -> Self {
        let shown = selected.unwrap_or(today);
        Self {
            year: shown.year(),
            month: shown.month(),
            selected,
            overlay: Overlay::None,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn selected(&self) -> Option<NaiveDate> {
        self.selected
    }

    pub fn overlay(&self) -> Overlay {
        self.overlay
    }

    pub fn displayed(&self) -> (i32, u32) {
        (self.year, self.month)
    }

    pub fn open(&mut self) {
        self.open = true;
        self.overlay = Overlay::None;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.overlay = Overlay::None;
    }

    pub fn toggle_year_picker(&mut self) {
        self.overlay = match self.overlay {
            Overlay::YearPicker => Overlay::None,
            _ => Overlay::YearPicker,
        };
    }

    pub fn toggle_month_picker(&mut self) {
        self.overlay = match self.overlay {
            Overlay::MonthPicker => Overlay::None,
            _ => Overlay::MonthPicker,
        };
    }

    pub fn choose_year(&mut self, year: i32) {
        if NaiveDate::from_ymd_opt(year, self.month, 1).is_some() {
            self.year = year;
        }
        self.overlay = Overlay::None;
    }

    pub fn choose_month(&mut self, month: u32) {
        if (1..=12).contains(&month) {
            self.month = month;
        }
        self.overlay = Overlay::None;
    }

    fn shift(&mut self, forward: bool) {
        let Some(first) = NaiveDate::from_ymd_opt(self.year, self.month, 1) else {
            return;
        };
        let shifted = if forward {
            first.checked_add_months(Months::new(1))
        } else {
            first.checked_sub_months(Months::new(1))
        };
        if let Some(date) = shifted {
            self.year = date.year();
            self.month = date.month();
        }
    }

    pub fn prev_month(&mut self) {
        self.shift(false);
    }

    pub fn next_month(&mut self) {
        self.shift(true);
    }

    /// Commits `date` and closes the picker.
    pub fn select_day(&mut self, date: NaiveDate) {
        self.selected = Some(date);
        self.year = date.year();
        self.month = date.month();
        self.close();
    }

    pub fn view(&self) -> Option<CalendarMonth> {
        CalendarMonth::new(self.year, self.month)
    }

    pub fn handle(&mut self, event: DateEvent) {
        match event {
            DateEvent::Open => self.open(),
            DateEvent::Close => self.close(),
            DateEvent::ToggleYearPicker => self.toggle_year_picker(),
            DateEvent::ToggleMonthPicker => self.toggle_month_picker(),
            DateEvent::ChooseYear(year) => self.choose_year(year),
            DateEvent::ChooseMonth(month) => self.choose_month(month),
            DateEvent::PrevMonth => self.prev_month(),
            DateEvent::NextMonth => self.next_month(),
            DateEvent::SelectDay(date) => self.select_day(date),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RangeState {
    Closed,
    PickingStart,
    PickingEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "date", rename_all = "camelCase")]
pub enum RangeEvent {
    OpenStart,
    OpenEnd,
    Click(NaiveDate),
    Close,
}

/// Two-click start/end picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateRangePicker {
    state: RangeState,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl Default for DateRangePicker {
    fn default() -> Self {
        Self {
            state: RangeState::Closed,
            start: None,
            end: None,
        }
    }
}

impl DateRangePicker {
    pub fn state(&self) -> RangeState {
        self.state
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    pub fn handle(&mut self, event: RangeEvent) {
        self.state = match (self.state, event) {
            (_, RangeEvent::OpenStart) => RangeState::PickingStart,
            (_, RangeEvent::OpenEnd) if self.start.is_some() => RangeState::PickingEnd,
            (_, RangeEvent::OpenEnd) => RangeState::PickingStart,
            (_, RangeEvent::Close) => RangeState::Closed,
            (RangeState::Closed, RangeEvent::Click(_)) => RangeState::Closed,
            (RangeState::PickingStart, RangeEvent::Click(date)) => {
                self.start = Some(date);
                self.end = None;
                RangeState::PickingEnd
            }
            (RangeState::PickingEnd, RangeEvent::Click(date)) => {
                match self.start {
                    Some(start) if date < start => {
                        self.start = Some(date);
                        self.end = Some(start);
                    }
                    Some(_) => self.end = Some(date),
                    None => self.start = Some(date),
                }
                if self.end.is_some() {
                    RangeState::Closed
                } else {
                    RangeState::PickingEnd
                }
            }
        };
    }
}

#[get("/calendar/<year>/<month>")]
fn month_grid(year: i32, month: u32) -> Result<Json<CalendarMonth>, ApiError> {
    CalendarMonth::new(year, month)
        .map(Json)
        .ok_or_else(|| ApiError::BadRequest(format!("Некорректный месяц: {year}-{month}")))
}

#[derive(Deserialize)]
struct DateStep {
    picker: DatePicker,
    event: DateEvent,
}

/// Applies one event to a single-date picker and returns the new state with its grid.
#[post("/calendar/date", data = "<step>")]
fn date_step(step: Json<DateStep>) -> Json<serde_json::Value> {
    let DateStep { mut picker, event } = step.into_inner();
    picker.handle(event);
    let grid = picker.view();
    Json(serde_json::json!({ "picker": picker, "grid": grid }))
}

#[derive(Deserialize)]
struct RangeStep {
    #[serde(default)]
    picker: DateRangePicker,
    event: RangeEvent,
}

#[post("/calendar/range", data = "<step>")]
fn range_step(step: Json<RangeStep>) -> Json<DateRangePicker> {
    let RangeStep { mut picker, event } = step.into_inner();
    picker.handle(event);
    Json(picker)
}

pub fn routes() -> Vec<Route> {
    routes![month_grid, date_step, range_step]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2024, 12), Some(31));
        assert_eq!(days_in_month(2024, 13), None);
    }

    #[test]
    fn grid_starts_on_monday() {
        // 1 January 2024 was a Monday, 1 September 2024 a Sunday.
        let january = CalendarMonth::new(2024, 1).unwrap();
        assert_eq!(january.weeks[0][0], Some(ymd(2024, 1, 1)));
        assert_eq!(january.weeks.len(), 5);

        let september = CalendarMonth::new(2024, 9).unwrap();
        assert_eq!(september.weeks[0][..6], [None; 6]);
        assert_eq!(september.weeks[0][6], Some(ymd(2024, 9, 1)));
        assert_eq!(september.weeks.len(), 6);
        let days = september.weeks.iter().flatten().flatten().count();
        assert_eq!(days, 30);
    }

    #[test]
    fn overlays_are_exclusive() {
        let mut picker = DatePicker::new(ymd(2024, 5, 20), None);
        picker.open();
        picker.toggle_year_picker();
        assert_eq!(picker.overlay(), Overlay::YearPicker);
        picker.toggle_month_picker();
        assert_eq!(picker.overlay(), Overlay::MonthPicker);
        picker.toggle_month_picker();
        assert_eq!(picker.overlay(), Overlay::None);

        picker.toggle_year_picker();
        picker.choose_year(2022);
        assert_eq!(picker.overlay(), Overlay::None);
        assert_eq!(picker.displayed(), (2022, 5));
    }

    #[test]
    fn month_navigation_wraps_years() {
        let mut picker = DatePicker::new(ymd(2024, 1, 15), None);
        picker.prev_month();
        assert_eq!(picker.displayed(), (2023, 12));
        picker.next_month();
        picker.next_month();
        assert_eq!(picker.displayed(), (2024, 2));
    }

    #[test]
    fn selecting_a_day_commits_and_closes() {
        let mut picker = DatePicker::new(ymd(2024, 1, 15), None);
        picker.open();
        picker.choose_month(3);
        picker.select_day(ymd(2024, 3, 8));
        assert!(!picker.is_open());
        assert_eq!(picker.selected(), Some(ymd(2024, 3, 8)));
        assert_eq!(picker.view().unwrap().month, 3);
    }

    #[test]
    fn earlier_second_click_swaps_the_range() {
        let mut picker = DateRangePicker::default();
        assert_eq!(picker.state(), RangeState::Closed);

        picker.handle(RangeEvent::OpenStart);
        assert_eq!(picker.state(), RangeState::PickingStart);

        picker.handle(RangeEvent::Click(ymd(2024, 6, 10)));
        assert_eq!(picker.state(), RangeState::PickingEnd);
        assert_eq!(picker.start(), Some(ymd(2024, 6, 10)));

        picker.handle(RangeEvent::Click(ymd(2024, 6, 5)));
        assert_eq!(picker.start(), Some(ymd(2024, 6, 5)));
        assert_eq!(picker.end(), Some(ymd(2024, 6, 10)));
        assert_eq!(picker.state(), RangeState::Closed);
    }

    #[test]
    fn later_second_click_sets_end() {
        let mut picker = DateRangePicker::default();
        picker.handle(RangeEvent::OpenStart);
        picker.handle(RangeEvent::Click(ymd(2024, 6, 10)));
        picker.handle(RangeEvent::Click(ymd(2024, 6, 10)));
        assert_eq!(picker.end(), Some(ymd(2024, 6, 10)));
        assert_eq!(picker.state(), RangeState::Closed);
    }

    #[test]
    fn events_deserialize_from_tagged_json() {
        let event: RangeEvent =
            serde_json::from_str(r#"{"type": "click", "date": "2024-06-10"}"#).unwrap();
        assert_eq!(event, RangeEvent::Click(ymd(2024, 6, 10)));
        let event: RangeEvent = serde_json::from_str(r#"{"type": "openStart"}"#).unwrap();
        assert_eq!(event, RangeEvent::OpenStart);

        let mut picker = DatePicker::new(ymd(2024, 1, 15), None);
        let event: DateEvent =
            serde_json::from_str(r#"{"type": "chooseYear", "value": 2020}"#).unwrap();
        picker.handle(DateEvent::ToggleYearPicker);
        picker.handle(event);
        assert_eq!(picker.displayed(), (2020, 1));
        assert_eq!(picker.overlay(), Overlay::None);
    }

    #[test]
    fn clicks_while_closed_are_ignored_and_close_keeps_values() {
        let mut picker = DateRangePicker::default();
        picker.handle(RangeEvent::Click(ymd(2024, 6, 10)));
        assert_eq!(picker.start(), None);

        picker.handle(RangeEvent::OpenEnd);
        assert_eq!(picker.state(), RangeState::PickingStart);
        picker.handle(RangeEvent::Click(ymd(2024, 6, 1)));
        picker.handle(RangeEvent::Close);
        assert_eq!(picker.state(), RangeState::Closed);
        assert_eq!(picker.start(), Some(ymd(2024, 6, 1)));
        assert_eq!(picker.end(), None);
    }
}
