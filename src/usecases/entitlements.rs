use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::entities::enrollments::UpsertEnrollmentEntity;
use crate::domain::entities::products::ProductEntity;
use crate::domain::repositories::enrollments::EnrollmentRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::users::UserRepository;
use crate::domain::value_objects::enums::entitlement_items::{EntitlementItemType, GrantSource};
use crate::domain::value_objects::enums::product_types::ProductType;

/// Grants and revokes downstream access derived from purchases and active
/// subscriptions. Upserts are keyed on (user, course) so repeated grants
/// leave exactly one active enrollment row, and revocation flips the
/// is_active flag instead of deleting.
pub struct EntitlementGrantor<P, En, U>
where
    P: ProductRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
{
    product_repo: Arc<P>,
    enrollment_repo: Arc<En>,
    user_repo: Arc<U>,
}

impl<P, En, U> EntitlementGrantor<P, En, U>
where
    P: ProductRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
{
    pub fn new(product_repo: Arc<P>, enrollment_repo: Arc<En>, user_repo: Arc<U>) -> Self {
        Self {
            product_repo,
            enrollment_repo,
            user_repo,
        }
    }

    /// Resolves the product's bundle into concrete course ids: direct
    /// courses, course groups expanded to members, and product aliases
    /// expanded one level through their own bundles.
    pub async fn resolve_course_ids(&self, product_id: Uuid) -> Result<Vec<Uuid>> {
        let mut course_ids = Vec::new();

        for item in self.product_repo.list_bundle_items(product_id).await? {
            match EntitlementItemType::from_str(&item.item_type) {
                EntitlementItemType::Course => course_ids.push(item.item_id),
                EntitlementItemType::CourseGroup => {
                    course_ids.extend(self.product_repo.list_group_courses(item.item_id).await?);
                }
                EntitlementItemType::Product => {
                    for nested in self.product_repo.list_bundle_items(item.item_id).await? {
                        match EntitlementItemType::from_str(&nested.item_type) {
                            EntitlementItemType::Course => course_ids.push(nested.item_id),
                            EntitlementItemType::CourseGroup => {
                                course_ids.extend(
                                    self.product_repo.list_group_courses(nested.item_id).await?,
                                );
                            }
                            // One level of aliasing is all the catalog uses.
                            EntitlementItemType::Product => {
                                warn!(
                                    product_id = %item.item_id,
                                    nested_product_id = %nested.item_id,
                                    "entitlements: skipping doubly-nested product alias"
                                );
                            }
                        }
                    }
                }
            }
        }

        course_ids.sort();
        course_ids.dedup();
        Ok(course_ids)
    }

    /// Grants every entitlement the product confers. Partial failures are
    /// logged and skipped, never propagated: payment success must not be
    /// undone by a downstream grant failure, and the next reconciliation
    /// pass retries the upsert.
    pub async fn grant(
        &self,
        user_id: Uuid,
        product: &ProductEntity,
        source: GrantSource,
        source_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let course_ids = self.resolve_course_ids(product.id).await?;

        let mut granted = Vec::with_capacity(course_ids.len());
        for course_id in course_ids {
            let upsert = UpsertEnrollmentEntity {
                user_id,
                course_id,
                source: source.to_string(),
                source_id: Some(source_id),
                is_active: true,
            };
            match self.enrollment_repo.upsert_enrollment(upsert).await {
                Ok(()) => granted.push(course_id),
                Err(err) => {
                    error!(
                        %user_id,
                        %course_id,
                        error = ?err,
                        "entitlements: enrollment upsert failed, will retry on next pass"
                    );
                }
            }
        }

        if ProductType::from_str(&product.product_type) == ProductType::Membership {
            if let Err(err) = self.user_repo.set_premium(user_id, true).await {
                error!(%user_id, error = ?err, "entitlements: failed to set premium flag");
            }
        }

        info!(
            %user_id,
            product_id = %product.id,
            granted = granted.len(),
            source = %source,
            "entitlements: grants applied"
        );

        Ok(granted)
    }

    /// Revoke path for full refunds and subscription cancellations: flips
    /// is_active=false so a later re-purchase reactivates via upsert.
    pub async fn revoke(
        &self,
        user_id: Option<Uuid>,
        product: &ProductEntity,
        source_id: Uuid,
    ) -> Result<usize> {
        let revoked = self.enrollment_repo.deactivate_for_source(source_id).await?;

        if ProductType::from_str(&product.product_type) == ProductType::Membership {
            if let Some(user_id) = user_id {
                if let Err(err) = self.user_repo.set_premium(user_id, false).await {
                    error!(%user_id, error = ?err, "entitlements: failed to clear premium flag");
                }
            }
        }

        info!(
            source_id = %source_id,
            revoked,
            "entitlements: grants revoked"
        );

        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::products::ProductItemEntity;
    use crate::domain::repositories::enrollments::MockEnrollmentRepository;
    use crate::domain::repositories::products::MockProductRepository;
    use crate::domain::repositories::users::MockUserRepository;
    use chrono::Utc;
    use mockall::predicate::eq;

    fn product(product_type: &str) -> ProductEntity {
        ProductEntity {
            id: Uuid::new_v4(),
            name: "Bundle".to_string(),
            product_type: product_type.to_string(),
            base_amount_minor: 5000,
            base_currency: "USD".to_string(),
            billing_interval: None,
            trial_enabled: false,
            trial_days: 0,
            trial_amount_minor: 0,
            min_amount_minor: None,
            max_amount_minor: None,
            suggested_amount_minor: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn item(product_id: Uuid, item_id: Uuid, item_type: &str) -> ProductItemEntity {
        ProductItemEntity {
            id: 0,
            product_id,
            item_id,
            item_type: item_type.to_string(),
        }
    }

    #[tokio::test]
    async fn expands_course_groups_into_member_courses() {
        let product = product("one_time");
        let product_id = product.id;
        let group_id = Uuid::new_v4();
        let direct_course = Uuid::new_v4();
        let group_courses = vec![Uuid::new_v4(), Uuid::new_v4()];

        let mut product_repo = MockProductRepository::new();
        let items = vec![
            item(product_id, direct_course, "course"),
            item(product_id, group_id, "course_group"),
        ];
        product_repo
            .expect_list_bundle_items()
            .with(eq(product_id))
            .returning(move |_| {
                let items = items.clone();
                Box::pin(async move { Ok(items) })
            });
        let expanded = group_courses.clone();
        product_repo
            .expect_list_group_courses()
            .with(eq(group_id))
            .returning(move |_| {
                let expanded = expanded.clone();
                Box::pin(async move { Ok(expanded) })
            });

        let grantor = EntitlementGrantor::new(
            Arc::new(product_repo),
            Arc::new(MockEnrollmentRepository::new()),
            Arc::new(MockUserRepository::new()),
        );

        let mut resolved = grantor.resolve_course_ids(product_id).await.unwrap();
        resolved.sort();
        let mut expected = vec![direct_course, group_courses[0], group_courses[1]];
        expected.sort();
        assert_eq!(resolved, expected);
    }

    #[tokio::test]
    async fn partial_upsert_failure_never_fails_the_grant() {
        let product = product("one_time");
        let product_id = product.id;
        let course_ok = Uuid::new_v4();
        let course_broken = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let mut product_repo = MockProductRepository::new();
        let items = vec![
            item(product_id, course_ok, "course"),
            item(product_id, course_broken, "course"),
        ];
        product_repo.expect_list_bundle_items().returning(move |_| {
            let items = items.clone();
            Box::pin(async move { Ok(items) })
        });

        let mut enrollment_repo = MockEnrollmentRepository::new();
        enrollment_repo
            .expect_upsert_enrollment()
            .returning(move |upsert| {
                let broken = upsert.course_id == course_broken;
                Box::pin(async move {
                    if broken {
                        Err(anyhow::anyhow!("enrollment table unavailable"))
                    } else {
                        Ok(())
                    }
                })
            });

        let grantor = EntitlementGrantor::new(
            Arc::new(product_repo),
            Arc::new(enrollment_repo),
            Arc::new(MockUserRepository::new()),
        );

        let granted = grantor
            .grant(user_id, &product, GrantSource::Purchase, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(granted, vec![course_ok]);
    }

    #[tokio::test]
    async fn membership_grant_sets_premium_flag() {
        let product = product("membership");
        let user_id = Uuid::new_v4();

        let mut product_repo = MockProductRepository::new();
        product_repo
            .expect_list_bundle_items()
            .returning(|_| Box::pin(async { Ok(vec![]) }));

        let mut user_repo = MockUserRepository::new();
        user_repo
            .expect_set_premium()
            .with(eq(user_id), eq(true))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let grantor = EntitlementGrantor::new(
            Arc::new(product_repo),
            Arc::new(MockEnrollmentRepository::new()),
            Arc::new(user_repo),
        );

        grantor
            .grant(user_id, &product, GrantSource::Subscription, Uuid::new_v4())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn revoke_deactivates_by_source() {
        let product = product("one_time");
        let source_id = Uuid::new_v4();

        let mut enrollment_repo = MockEnrollmentRepository::new();
        enrollment_repo
            .expect_deactivate_for_source()
            .with(eq(source_id))
            .times(1)
            .returning(|_| Box::pin(async { Ok(3) }));

        let grantor = EntitlementGrantor::new(
            Arc::new(MockProductRepository::new()),
            Arc::new(enrollment_repo),
            Arc::new(MockUserRepository::new()),
        );

        let revoked = grantor.revoke(None, &product, source_id).await.unwrap();
        assert_eq!(revoked, 3);
    }
}
