//! Template catalog manager.

use std::sync::Arc;
use uuid::Uuid;

use super::{
    errors::{CatalogError, CatalogResult},
    models::{
        BonusKind, BonusTemplate, Category, NewTemplate, PayoutRule, TemplateFilter, TemplateId,
        TemplatePatch, TemplateStatus,
    },
};
use crate::{
    clock::Clock,
    db::{BonusRepository, Page, TemplateRepository, repository::MAX_PAGE_SIZE},
    locks::KeyedRwLocks,
};

/// Check a template's own consistency.
pub fn validate_template(template: &BonusTemplate) -> Result<(), String> {
    if template.name.trim().is_empty() {
        return Err("name is required".to_string());
    }

    let value = &template.value;
    if value.amount < 0 {
        return Err("value amount must not be negative".to_string());
    }
    if matches!(
        template.kind,
        BonusKind::DepositMatch(_) | BonusKind::ReloadBonus(_)
    ) && value.amount == 0
    {
        return Err("match percentage must be positive".to_string());
    }
    if let Some(max) = value.max_amount {
        if max < value.amount {
            return Err(format!(
                "max amount {max} is below amount {}",
                value.amount
            ));
        }
    }
    if value.min_deposit.is_some_and(|d| d < 0) {
        return Err("minimum deposit must not be negative".to_string());
    }

    let wagering = &template.wagering;
    if !wagering.multiplier.is_finite() || wagering.multiplier < 0.0 {
        return Err("wagering multiplier must be a non-negative number".to_string());
    }
    if !wagering.min_odds.is_finite() || wagering.min_odds < 1.0 {
        return Err("wagering min odds must be at least 1.0".to_string());
    }

    if template.validity.days_to_expire == 0 || template.validity.days_to_wager == 0 {
        return Err("validity windows must be at least one day".to_string());
    }

    template.kind.validate()
}

/// Templates move draft -> active <-> paused and nowhere else.
fn check_status_transition(from: TemplateStatus, to: TemplateStatus) -> CatalogResult<()> {
    let allowed = matches!(
        (from, to),
        (TemplateStatus::Draft, TemplateStatus::Active)
            | (TemplateStatus::Active, TemplateStatus::Paused)
            | (TemplateStatus::Paused, TemplateStatus::Active)
    );
    if !allowed {
        return Err(CatalogError::InvalidStatusTransition { from, to });
    }
    Ok(())
}

/// Template CRUD and status lifecycle
pub struct TemplateCatalog {
    templates: Arc<dyn TemplateRepository>,
    bonuses: Arc<dyn BonusRepository>,
    clock: Arc<dyn Clock>,
    /// Written by edits and deletes, read by claims
    template_locks: Arc<KeyedRwLocks<TemplateId>>,
}

impl TemplateCatalog {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        bonuses: Arc<dyn BonusRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            templates,
            bonuses,
            clock,
            template_locks: Arc::new(KeyedRwLocks::new()),
        }
    }

    /// Per-template gate to share with the claim path
    pub fn template_locks(&self) -> Arc<KeyedRwLocks<TemplateId>> {
        self.template_locks.clone()
    }

    /// Create a template in `draft` status.
    pub async fn create(&self, new: NewTemplate) -> CatalogResult<BonusTemplate> {
        let now = self.clock.now();
        let template = BonusTemplate {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            description: new.description,
            kind: new.kind,
            category: new.category,
            value: new.value,
            wagering: new.wagering,
            validity: new.validity,
            eligibility: new.eligibility,
            status: TemplateStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        validate_template(&template).map_err(CatalogError::Validation)?;

        self.templates.insert_template(&template).await?;
        log::info!(
            "Created {} template {} ({})",
            template.kind.bonus_type(),
            template.id,
            template.name
        );
        Ok(template)
    }

    pub async fn get(&self, id: TemplateId) -> CatalogResult<BonusTemplate> {
        self.templates
            .get_template(id)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    /// Apply a partial update.
    pub async fn update(&self, id: TemplateId, patch: TemplatePatch) -> CatalogResult<BonusTemplate> {
        self.edit(id, patch, None).await
    }

    /// Move a template along draft -> active <-> paused.
    pub async fn set_status(
        &self,
        id: TemplateId,
        status: TemplateStatus,
    ) -> CatalogResult<BonusTemplate> {
        self.edit(id, TemplatePatch::default(), Some(status)).await
    }

    /// Apply a patch and an optional status change in a single write.
    ///
    /// Nothing is stored unless every part is accepted. Claims of the
    /// template wait until the edit is done.
    ///
    /// # Errors
    ///
    /// * `CatalogError::InvalidStatusTransition` - status change outside
    ///   draft -> active <-> paused
    /// * `CatalogError::TemplateImmutableFieldsLocked` - financial fields
    ///   changed on a template that players already claimed
    pub async fn edit(
        &self,
        id: TemplateId,
        patch: TemplatePatch,
        status: Option<TemplateStatus>,
    ) -> CatalogResult<BonusTemplate> {
        let _gate = self.template_locks.write(id).await;
        let mut template = self.get(id).await?;
        let from = template.status;
        if let Some(to) = status {
            check_status_transition(from, to)?;
        }

        let financial = patch.financial_changes(&template);
        if !financial.is_empty() {
            let claimed = self.bonuses.count_bonuses_for_template(id).await?;
            if claimed > 0 {
                log::warn!(
                    "Rejected update of template {} fields {:?}: {} bonuses claimed",
                    id,
                    financial,
                    claimed
                );
                return Err(CatalogError::TemplateImmutableFieldsLocked {
                    template_id: id,
                    fields: financial,
                });
            }
        }

        let edited = !patch.is_empty();
        patch.apply(&mut template);
        template.name = template.name.trim().to_string();
        validate_template(&template).map_err(CatalogError::Validation)?;
        if let Some(to) = status {
            template.status = to;
        }
        template.updated_at = self.clock.now();

        if financial.is_empty() {
            self.templates.save_template(&template).await?;
        } else if !self.templates.save_unclaimed_template(&template).await? {
            log::warn!("Template {} was claimed while editing {:?}", id, financial);
            return Err(CatalogError::TemplateImmutableFieldsLocked {
                template_id: id,
                fields: financial,
            });
        }

        if edited {
            log::info!("Updated template {}", id);
        }
        if let Some(to) = status {
            log::info!("Template {} status {} -> {}", id, from, to);
        }
        Ok(template)
    }

    /// Delete a template nobody has claimed.
    pub async fn delete(&self, id: TemplateId) -> CatalogResult<()> {
        let _gate = self.template_locks.write(id).await;
        self.get(id).await?;
        let claimed = self.bonuses.count_bonuses_for_template(id).await?;
        if claimed > 0 {
            return Err(CatalogError::TemplateInUse {
                template_id: id,
                bonuses: claimed,
            });
        }
        if !self.templates.delete_template(id).await? {
            return Err(CatalogError::NotFound(id));
        }
        log::info!("Deleted template {}", id);
        Ok(())
    }

    pub async fn list(&self, filter: &TemplateFilter) -> CatalogResult<Page<BonusTemplate>> {
        Ok(self.templates.list_templates(filter).await?)
    }

    /// Active templates claimable from `category` (`None` for every category).
    pub async fn list_active(&self, category: Option<Category>) -> CatalogResult<Vec<BonusTemplate>> {
        let mut active = Vec::new();
        let mut filter = TemplateFilter {
            status: Some(TemplateStatus::Active),
            page: 1,
            page_size: MAX_PAGE_SIZE,
            ..Default::default()
        };
        loop {
            let page = self.templates.list_templates(&filter).await?;
            let last = u64::from(page.page) >= page.total_pages();
            active.extend(
                page.items
                    .into_iter()
                    .filter(|t| category.is_none_or(|c| t.category.accepts_channel(c))),
            );
            if last {
                break;
            }
            filter.page += 1;
        }
        Ok(active)
    }
}
