//! Changeover detection: one cleaning task per booking checkout.
use crate::model::{Booking, CleaningTask, TaskType};

/// Stable task id: property name without spaces plus the checkout date.
pub fn task_id(property_name: &str, checkout: chrono::NaiveDate) -> String {
    format!(
        "{}-{}",
        property_name.replace(' ', ""),
        checkout.format("%d%m%Y")
    )
}

/// Derive cleaning tasks from bookings sorted by start and deduplicated on
/// (start, end). Only the immediately following booking decides the type.
pub fn detect(bookings: &[Booking], property_name: &str, cleaners: &[String]) -> Vec<CleaningTask> {
    let assigned = cleaners.first().cloned();
    bookings
        .iter()
        .enumerate()
        .map(|(i, booking)| {
            let checkout = booking.end;
            let same_day = bookings
                .get(i + 1)
                .is_some_and(|next| next.start == checkout);
            CleaningTask {
                id: task_id(property_name, checkout),
                date: checkout,
                property: property_name.to_string(),
                task_type: if same_day {
                    TaskType::CheckinSameDay
                } else {
                    TaskType::CheckinNotSameDay
                },
                assigned_cleaner: assigned.clone(),
            }
        })
        .collect()
}
