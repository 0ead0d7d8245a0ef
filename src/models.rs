//! Domain records embedded in units and return records.
//!
//! Buyer and warranty data are stored as flat column groups; these types
//! reassemble them for business logic and API responses.

use crate::entities::{RegistrationChannel, WarrantyStatus, return_record, unit};
use chrono::{DateTime, Months, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// Buyer contact and payment details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub payment_method: Option<String>,
}

impl Buyer {
    /// Trims every field and drops the empty ones.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            name: non_empty(self.name),
            phone: non_empty(self.phone),
            email: non_empty(self.email),
            address: non_empty(self.address),
            payment_method: non_empty(self.payment_method),
        }
    }

    pub(crate) fn apply_to(&self, active: &mut unit::ActiveModel) {
        active.buyer_name = Set(self.name.clone());
        active.buyer_phone = Set(self.phone.clone());
        active.buyer_email = Set(self.email.clone());
        active.buyer_address = Set(self.address.clone());
        active.buyer_payment_method = Set(self.payment_method.clone());
    }
}

/// Warranty sub-record of a unit.
///
/// `expires_at` is derived from `registered_at` and `duration_months` and is
/// only ever written through [`Warranty::set_duration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warranty {
    pub registered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub duration_months: u32,
    pub status: WarrantyStatus,
    pub bill_id: Option<i64>,
    pub registered_by: String,
    pub channel: RegistrationChannel,
    pub notes: Option<String>,
    pub last_modified_by: Option<String>,
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl Warranty {
    /// Sets the duration and recomputes the expiry from the registration date.
    ///
    /// Returns `None` (leaving the record untouched) if the date overflows.
    pub fn set_duration(&mut self, months: u32) -> Option<()> {
        self.expires_at = add_months(self.registered_at, months)?;
        self.duration_months = months;
        Some(())
    }

    /// Appends a line to the note log.
    pub fn append_note(&mut self, note: &str) {
        let note = note.trim();
        if note.is_empty() {
            return;
        }
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
    }

    /// Stamps the last-modified audit pair.
    pub fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
        self.last_modified_by = Some(actor.to_string());
        self.last_modified_at = Some(now);
    }

    /// Whether the coverage window has closed at `now`.
    #[must_use]
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Status as reported: `active` warranties past expiry count as `expired`.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> WarrantyStatus {
        if self.status == WarrantyStatus::Active && self.is_past_expiry(now) {
            WarrantyStatus::Expired
        } else {
            self.status
        }
    }

    pub(crate) fn apply_to(&self, active: &mut unit::ActiveModel) {
        active.warranty_registered = Set(true);
        active.warranty_status = Set(Some(self.status));
        active.warranty_registered_at = Set(Some(self.registered_at));
        active.warranty_expires_at = Set(Some(self.expires_at));
        active.warranty_duration_months = Set(Some(i32::try_from(self.duration_months).unwrap_or(i32::MAX)));
        active.warranty_bill_id = Set(self.bill_id);
        active.warranty_registered_by = Set(Some(self.registered_by.clone()));
        active.warranty_channel = Set(Some(self.channel));
        active.warranty_notes = Set(self.notes.clone());
        active.warranty_modified_by = Set(self.last_modified_by.clone());
        active.warranty_modified_at = Set(self.last_modified_at);
    }
}

/// Adds calendar months, clamping to the last day of shorter months.
#[must_use]
pub fn add_months(from: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    from.checked_add_months(Months::new(months))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

macro_rules! impl_embedded_records {
    ($model:ty) => {
        impl $model {
            /// Buyer record assembled from the `buyer_*` columns.
            #[must_use]
            pub fn buyer(&self) -> Buyer {
                Buyer {
                    name: self.buyer_name.clone(),
                    phone: self.buyer_phone.clone(),
                    email: self.buyer_email.clone(),
                    address: self.buyer_address.clone(),
                    payment_method: self.buyer_payment_method.clone(),
                }
            }

            /// Warranty record assembled from the `warranty_*` columns, if present.
            #[must_use]
            pub fn warranty(&self) -> Option<Warranty> {
                let status = self.warranty_status?;
                let registered_at = self.warranty_registered_at?;
                Some(Warranty {
                    registered_at,
                    expires_at: self.warranty_expires_at.unwrap_or(registered_at),
                    duration_months: self
                        .warranty_duration_months
                        .and_then(|m| u32::try_from(m).ok())
                        .unwrap_or_default(),
                    status,
                    bill_id: self.warranty_bill_id,
                    registered_by: self.warranty_registered_by.clone().unwrap_or_default(),
                    channel: self.warranty_channel.unwrap_or(RegistrationChannel::Admin),
                    notes: self.warranty_notes.clone(),
                    last_modified_by: self.warranty_modified_by.clone(),
                    last_modified_at: self.warranty_modified_at,
                })
            }

            /// A unit is sold iff its sale date is set.
            #[must_use]
            pub const fn is_sold(&self) -> bool {
                self.sold_at.is_some()
            }
        }
    };
}

impl_embedded_records!(unit::Model);
impl_embedded_records!(return_record::Model);

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::TimeZone;

    fn warranty_at(registered_at: DateTime<Utc>, months: u32) -> Warranty {
        Warranty {
            registered_at,
            expires_at: add_months(registered_at, months).unwrap(),
            duration_months: months,
            status: WarrantyStatus::Active,
            bill_id: None,
            registered_by: "admin@example.com".to_string(),
            channel: RegistrationChannel::Admin,
            notes: None,
            last_modified_by: None,
            last_modified_at: None,
        }
    }

    #[test]
    fn test_add_months_clamps_to_month_end() {
        let jan_31 = Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap();
        let feb = add_months(jan_31, 1).unwrap();
        assert_eq!(feb, Utc.with_ymd_and_hms(2025, 2, 28, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_set_duration_recomputes_from_registration_date() {
        let registered = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let mut warranty = warranty_at(registered, 12);
        warranty.set_duration(24).unwrap();
        assert_eq!(warranty.duration_months, 24);
        assert_eq!(
            warranty.expires_at,
            Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_append_note_keeps_history() {
        let mut warranty = warranty_at(Utc::now(), 12);
        warranty.append_note("first");
        warranty.append_note("   ");
        warranty.append_note("second");
        assert_eq!(warranty.notes.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_effective_status_reclassifies_overdue_active() {
        let registered = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut warranty = warranty_at(registered, 12);
        let now = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(warranty.effective_status(now), WarrantyStatus::Expired);

        warranty.status = WarrantyStatus::Pending;
        assert_eq!(warranty.effective_status(now), WarrantyStatus::Pending);
    }

    #[test]
    fn test_buyer_normalized_drops_blank_fields() {
        let buyer = Buyer {
            name: Some("  Jane ".into()),
            phone: Some(String::new()),
            email: None,
            address: Some("   ".into()),
            payment_method: Some("card".into()),
        }
        .normalized();
        assert_eq!(buyer.name.as_deref(), Some("Jane"));
        assert!(buyer.phone.is_none());
        assert!(buyer.address.is_none());
        assert_eq!(buyer.payment_method.as_deref(), Some("card"));
    }
}
