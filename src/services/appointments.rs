//! Appointment writes with time-range and conflict validation

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;
use uuid::Uuid;

use super::SaveError;
use crate::db::Store;
use crate::types::validation::check_length;
use crate::types::{Appointment, AppointmentInput, NewAppointment, ValidationErrors, BASE};

const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M";

pub struct AppointmentService {
    store: Arc<dyn Store>,
    offset: FixedOffset,
}

impl AppointmentService {
    pub fn new(store: Arc<dyn Store>, offset: FixedOffset) -> Self {
        Self { store, offset }
    }

    fn display(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format(DISPLAY_FORMAT).to_string()
    }

    /// Field rules first, then the overlap check against the owner's other
    /// appointments. `exclude` is the record being updated.
    async fn validate(
        &self,
        user_id: Uuid,
        input: &AppointmentInput,
        exclude: Option<Uuid>,
    ) -> Result<NewAppointment, SaveError> {
        let mut errors = ValidationErrors::default();

        check_length(&mut errors, "name", input.name.as_deref(), 3, 100);
        if input.start_time.is_none() {
            errors.add("start_time", "não pode ficar em branco");
        }
        if input.end_time.is_none() {
            errors.add("end_time", "não pode ficar em branco");
        }

        let (Some(start), Some(end)) = (input.start_time, input.end_time) else {
            return Err(SaveError::Invalid(errors));
        };

        if end <= start {
            errors.add("end_time", "deve ser posterior ao horário de início");
        }

        if let Some(conflict) = self
            .store
            .find_conflicting_appointment(user_id, start, end, exclude)
            .await?
        {
            errors.add(
                BASE,
                format!(
                    "Conflito de horário com o compromisso '{}' ({} - {})",
                    conflict.name,
                    self.display(conflict.start_time),
                    self.display(conflict.end_time)
                ),
            );
        }

        errors
            .into_result(NewAppointment {
                name: input.name.clone().unwrap_or_default(),
                start_time: start,
                end_time: end,
            })
            .map_err(SaveError::Invalid)
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        input: &AppointmentInput,
    ) -> Result<Appointment, SaveError> {
        let new_appointment = self.validate(user_id, input, None).await?;
        let appointment = self.store.insert_appointment(user_id, &new_appointment).await?;
        debug!("Appointment {} created for user {}", appointment.id, user_id);
        Ok(appointment)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: &AppointmentInput,
    ) -> Result<Option<Appointment>, SaveError> {
        let Some(existing) = self.store.get_appointment(user_id, id).await? else {
            return Ok(None);
        };

        let merged = input.merged_over(&existing);
        let new_appointment = self.validate(user_id, &merged, Some(id)).await?;
        Ok(self.store.update_appointment(user_id, id, &new_appointment).await?)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        self.store.delete_appointment(user_id, id).await
    }
}
