use crate::clock;
use crate::error::SchedError;
use crate::forecast::{scaled_headcount, Forecast};
use crate::model::{Shift, ShiftTemplate};
use chrono::NaiveDate;

pub fn validate_template(template: &ShiftTemplate) -> Result<(), SchedError> {
    if template.id.as_str().trim().is_empty() {
        return Err(SchedError::InvalidTemplate("template id cannot be empty".into()));
    }
    if template.day_of_week > 6 {
        return Err(SchedError::InvalidTemplate(format!(
            "day_of_week must be within 0..=6, got {}",
            template.day_of_week
        )));
    }
    if template.start_time == template.end_time {
        return Err(SchedError::InvalidTemplate(
            "start_time and end_time cannot be equal".into(),
        ));
    }
    if let Some(rating) = template.requirements.min_rating {
        if !(0.0..=5.0).contains(&rating) {
            return Err(SchedError::InvalidTemplate(format!(
                "min_rating must be within 0..=5, got {rating}"
            )));
        }
    }
    Ok(())
}

/// Génère les créneaux ouverts d'une semaine à partir des templates actifs.
///
/// Pour chaque jour, chaque template du même jour de semaine produit
/// `ceil(drivers_needed × multiplicateur)` créneaux non affectés. Aucune
/// écriture : la persistance est une étape séparée.
pub fn generate_week(
    templates: &[ShiftTemplate],
    week_start: NaiveDate,
    forecast: &Forecast,
) -> Result<Vec<Shift>, SchedError> {
    for template in templates {
        validate_template(template)?;
    }

    let mut shifts = Vec::new();
    for date in clock::week_dates(week_start) {
        let weekday = clock::day_of_week(date);
        let multiplier = forecast.multiplier(date);

        for template in templates
            .iter()
            .filter(|t| t.active && t.day_of_week == weekday)
        {
            let count = scaled_headcount(template.drivers_needed, multiplier);
            shifts.extend((0..count).map(|_| Shift::from_template(template, date)));
        }
    }
    Ok(shifts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_hhmm;
    use crate::model::{ShiftStatus, TemplateId};

    #[test]
    fn rejects_out_of_range_weekday() {
        let mut t = ShiftTemplate::new(
            "bad",
            7,
            parse_hhmm("09:00").unwrap(),
            parse_hhmm("12:00").unwrap(),
            1,
        );
        assert!(validate_template(&t).is_err());
        t.day_of_week = 6;
        assert!(validate_template(&t).is_ok());
        t.id = TemplateId::new(" ");
        assert!(validate_template(&t).is_err());
    }

    #[test]
    fn inactive_and_zero_headcount_templates_produce_nothing() {
        let monday = NaiveDate::from_ymd_opt(2025, 10, 27).unwrap();
        let mut inactive = ShiftTemplate::new(
            "lunch",
            1,
            parse_hhmm("11:00").unwrap(),
            parse_hhmm("14:00").unwrap(),
            3,
        );
        inactive.active = false;
        let zero = ShiftTemplate::new(
            "dinner",
            1,
            parse_hhmm("18:00").unwrap(),
            parse_hhmm("22:00").unwrap(),
            0,
        );
        let shifts = generate_week(&[inactive, zero], monday, &Forecast::default()).unwrap();
        assert!(shifts.is_empty());
    }

    #[test]
    fn generated_shifts_are_open_and_unassigned() {
        let monday = NaiveDate::from_ymd_opt(2025, 10, 27).unwrap();
        let t = ShiftTemplate::new(
            "lunch",
            1,
            parse_hhmm("11:00").unwrap(),
            parse_hhmm("14:00").unwrap(),
            2,
        );
        let shifts = generate_week(std::slice::from_ref(&t), monday, &Forecast::default()).unwrap();
        assert_eq!(shifts.len(), 2);
        assert!(shifts
            .iter()
            .all(|s| s.status == ShiftStatus::Open && s.driver_id.is_none() && s.date == monday));
        assert_eq!(shifts[0].template_id.as_ref(), Some(&t.id));
    }
}
