use crate::domain::models::{DEFAULT_DURATION, TimerRecord, TimerShape};

type SeatLayout = (&'static str, f64, f64, f64, TimerShape);

const SEATS: &[SeatLayout] = &[
    // Inside: bar counter
    ("1", 155.0, 95.0, 1.0, TimerShape::Circle),
    ("2", 215.0, 95.0, 1.0, TimerShape::Circle),
    ("3", 275.0, 95.0, 1.0, TimerShape::Circle),

    // Inside: long table
    ("4", 260.0, 150.0, 0.9, TimerShape::Circle),
    ("5", 260.0, 195.0, 0.9, TimerShape::Circle),
    ("6", 260.0, 240.0, 0.9, TimerShape::Circle),
    ("7", 260.0, 285.0, 0.9, TimerShape::Circle),
    ("8", 260.0, 330.0, 0.9, TimerShape::Circle),
    ("9", 320.0, 150.0, 0.9, TimerShape::Circle),
    ("10", 320.0, 195.0, 0.9, TimerShape::Circle),
    ("11", 320.0, 240.0, 0.9, TimerShape::Circle),
    ("12", 320.0, 285.0, 0.9, TimerShape::Circle),
    ("13", 320.0, 330.0, 0.9, TimerShape::Circle),
    ("14", 145.0, 150.0, 0.9, TimerShape::Circle),
    ("15", 145.0, 195.0, 0.9, TimerShape::Circle),
    ("16", 145.0, 240.0, 0.9, TimerShape::Circle),
    ("17", 145.0, 285.0, 0.9, TimerShape::Circle),
    ("18", 145.0, 330.0, 0.9, TimerShape::Circle),

    // Inside: middle aisle
    ("19", 80.0, 260.0, 1.0, TimerShape::Circle),
    ("20", 80.0, 360.0, 1.0, TimerShape::Circle),
    ("21", 80.0, 460.0, 1.0, TimerShape::Circle),

    // Inside: back corner
    ("22", 320.0, 390.0, 0.9, TimerShape::Circle),
    ("23", 315.0, 450.0, 0.9, TimerShape::Circle),
    ("24", 270.0, 485.0, 0.9, TimerShape::Circle),

    // Inside: entrance
    ("25", 205.0, 550.0, 0.9, TimerShape::Circle),
    ("26", 205.0, 600.0, 0.9, TimerShape::Circle),

    // Inside: left wall
    ("27", 12.0, 35.0, 0.9, TimerShape::Circle),
    ("28", 12.0, 80.0, 0.9, TimerShape::Circle),
    ("29", 12.0, 540.0, 0.9, TimerShape::Circle),
    ("30", 12.0, 585.0, 0.9, TimerShape::Circle),

    // Outside: terrace left
    ("31", 15.0, 10.0, 0.9, TimerShape::Circle),
    ("32", 15.0, 55.0, 0.9, TimerShape::Circle),
    ("33", 15.0, 100.0, 0.9, TimerShape::Circle),
    ("34", 15.0, 145.0, 0.9, TimerShape::Circle),

    // Outside: terrace right
    ("35", 162.0, 10.0, 0.9, TimerShape::Circle),
    ("36", 162.0, 55.0, 0.9, TimerShape::Circle),
    ("37", 162.0, 100.0, 0.9, TimerShape::Circle),
    ("38", 162.0, 145.0, 0.9, TimerShape::Circle),
    ("39", 162.0, 190.0, 0.9, TimerShape::Circle),

    // Outside: by the door
    ("40", 210.0, 293.0, 1.0, TimerShape::Circle),
    ("41", 260.0, 293.0, 1.0, TimerShape::Circle),
    ("42", 325.0, 310.0, 1.0, TimerShape::Circle),
    ("43", 315.0, 365.0, 1.0, TimerShape::Circle),

    // Outside: garden
    ("44", 210.0, 365.0, 1.0, TimerShape::Circle),
    ("45", 210.0, 440.0, 1.0, TimerShape::Circle),
    ("46", 210.0, 515.0, 1.0, TimerShape::Circle),
    ("47", 265.0, 440.0, 1.0, TimerShape::Circle),
    ("48", 265.0, 515.0, 1.0, TimerShape::Circle),

    // Outside: benches
    ("49", 87.0, 20.0, 1.0, TimerShape::Rectangle),
    ("50", 87.0, 75.0, 1.0, TimerShape::Rectangle),
    ("51", 87.0, 130.0, 1.0, TimerShape::Rectangle),
];

/// The fixed floor-plan layout every timer list is reconciled against.
pub fn initial_timers() -> Vec<TimerRecord> {
    SEATS
        .iter()
        .map(|&(id, x, y, scale, shape)| TimerRecord {
            id: id.to_string(),
            x,
            y,
            scale,
            shape,
            duration: DEFAULT_DURATION.to_string(),
            start: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::FloorArea;
    use std::collections::HashSet;

    #[test]
    fn seed_ids_are_unique_and_idle() {
        let timers = initial_timers();
        let ids: HashSet<_> = timers.iter().map(|timer| timer.id.as_str()).collect();
        assert_eq!(ids.len(), timers.len());
        assert_eq!(timers.len(), 51);
        assert!(timers.iter().all(|timer| timer.start.is_none()));
        assert!(timers.iter().all(|timer| timer.validate().is_ok()));
    }

    #[test]
    fn only_bench_seats_are_rectangles() {
        let rectangles: Vec<_> = initial_timers()
            .into_iter()
            .filter(|timer| timer.shape == TimerShape::Rectangle)
            .map(|timer| timer.id)
            .collect();
        assert_eq!(rectangles, vec!["49", "50", "51"]);
    }

    #[test]
    fn every_seed_belongs_to_an_area() {
        let timers = initial_timers();
        let inside = timers
            .iter()
            .filter(|timer| timer.area() == Some(FloorArea::Inside))
            .count();
        let outside = timers
            .iter()
            .filter(|timer| timer.area() == Some(FloorArea::Outside))
            .count();
        assert_eq!((inside, outside), (30, 21));
    }
}
