//! In-process store backend.
//!
//! Backs the test suite and the embedded deployment. Mutations go
//! through the same semantic operations the production driver exposes,
//! and course/enquiry mutations feed the change streams in commit order
//! (the mutex serializes commits, the per-watcher channels preserve
//! send order).

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use edumart_models::{
    Course, Enquiry, Institution, NewNotification, Notification, Student, Subscription,
    WishlistAction,
};

use crate::change::{ChangeEvent, ChangeOperation};
use crate::error::{StoreError, StoreResult};
use crate::{DocumentStore, WishlistOutcome};

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WishlistFailPoint {
    AfterMembershipWrite,
    AfterCounterAdjust,
}

#[derive(Default)]
struct Inner {
    institutions: HashMap<String, Institution>,
    courses: HashMap<String, Course>,
    enquiries: HashMap<String, Enquiry>,
    students: HashMap<String, Student>,
    subscriptions: HashMap<String, Subscription>,
    notifications: Vec<Notification>,
    course_watchers: Vec<mpsc::UnboundedSender<ChangeEvent<Course>>>,
    enquiry_watchers: Vec<mpsc::UnboundedSender<ChangeEvent<Enquiry>>>,
    #[cfg(test)]
    wishlist_fail: Option<WishlistFailPoint>,
}

impl Inner {
    #[cfg(test)]
    fn take_fail(&mut self, point: WishlistFailPoint) -> StoreResult<()> {
        if self.wishlist_fail == Some(point) {
            self.wishlist_fail = None;
            return Err(StoreError::transaction_aborted("forced failure"));
        }
        Ok(())
    }

    fn emit_course(&mut self, event: ChangeEvent<Course>) {
        self.course_watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn emit_enquiry(&mut self, event: ChangeEvent<Enquiry>) {
        self.enquiry_watchers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn institutions_of(&self, admin_id: &str) -> BTreeSet<String> {
        self.institutions
            .values()
            .filter(|i| i.admin_id.as_deref() == Some(admin_id))
            .map(|i| i.id.clone())
            .collect()
    }
}

/// In-memory [`DocumentStore`] implementation.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    // ---- write side (driven by the HTTP layer / tests) ----

    pub fn insert_institution(&self, institution: Institution) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .institutions
            .insert(institution.id.clone(), institution);
    }

    pub fn insert_student(&self, student: Student) {
        let mut inner = self.inner.lock().unwrap();
        inner.students.insert(student.id.clone(), student);
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Insert a course. Inserts are not delivered on the course change
    /// stream (it is filtered to update/replace).
    pub fn insert_course(&self, course: Course) {
        let mut inner = self.inner.lock().unwrap();
        inner.courses.insert(course.id.clone(), course);
    }

    /// Apply an update to a course and publish the resulting change
    /// event with the diffed field paths.
    pub fn update_course<F>(&self, course_id: &str, mutate: F) -> StoreResult<Course>
    where
        F: FnOnce(&mut Course),
    {
        let mut inner = self.inner.lock().unwrap();
        let old = inner
            .courses
            .get(course_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("course {}", course_id)))?;

        let mut updated = old.clone();
        mutate(&mut updated);
        let changed_paths = course_changed_paths(&old, &updated);
        inner.courses.insert(course_id.to_string(), updated.clone());

        if !changed_paths.is_empty() {
            inner.emit_course(ChangeEvent {
                operation: ChangeOperation::Update,
                document_id: course_id.to_string(),
                changed_paths,
                document: updated.clone(),
            });
        }
        Ok(updated)
    }

    /// Replace a course wholesale. Always publishes a `Replace` event,
    /// whether or not any field actually differs.
    pub fn replace_course(&self, course: Course) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let old = inner
            .courses
            .get(&course.id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("course {}", course.id)))?;

        let changed_paths = course_changed_paths(&old, &course);
        let document_id = course.id.clone();
        inner.courses.insert(document_id.clone(), course.clone());
        inner.emit_course(ChangeEvent {
            operation: ChangeOperation::Replace,
            document_id,
            changed_paths,
            document: course,
        });
        Ok(())
    }

    /// Insert an enquiry and publish its `Insert` event.
    pub fn insert_enquiry(&self, enquiry: Enquiry) {
        let mut inner = self.inner.lock().unwrap();
        inner.enquiries.insert(enquiry.id.clone(), enquiry.clone());
        inner.emit_enquiry(ChangeEvent {
            operation: ChangeOperation::Insert,
            document_id: enquiry.id.clone(),
            changed_paths: BTreeSet::new(),
            document: enquiry,
        });
    }

    // ---- read side used by tests ----

    pub fn course(&self, course_id: &str) -> Option<Course> {
        self.inner.lock().unwrap().courses.get(course_id).cloned()
    }

    pub fn student(&self, student_id: &str) -> Option<Student> {
        self.inner.lock().unwrap().students.get(student_id).cloned()
    }

    pub fn subscription(&self, subscription_id: &str) -> Option<Subscription> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .get(subscription_id)
            .cloned()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().notifications.clone()
    }

    #[cfg(test)]
    pub(crate) fn fail_wishlist_once(&self, point: WishlistFailPoint) {
        self.inner.lock().unwrap().wishlist_fail = Some(point);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_owning_admin(&self, institution_id: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .institutions
            .get(institution_id)
            .and_then(|i| i.admin_id.clone())
            .filter(|id| !id.is_empty()))
    }

    async fn sum_course_views(&self, admin_id: &str) -> StoreResult<i64> {
        let inner = self.inner.lock().unwrap();
        let owned = inner.institutions_of(admin_id);
        Ok(inner
            .courses
            .values()
            .filter(|c| owned.contains(&c.institution_id))
            .map(|c| c.course_views)
            .sum())
    }

    async fn sum_course_comparisons(&self, admin_id: &str) -> StoreResult<i64> {
        let inner = self.inner.lock().unwrap();
        let owned = inner.institutions_of(admin_id);
        Ok(inner
            .courses
            .values()
            .filter(|c| owned.contains(&c.institution_id))
            .map(|c| c.comparisons)
            .sum())
    }

    async fn count_leads(&self, admin_id: &str) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        let owned = inner.institutions_of(admin_id);
        Ok(inner
            .enquiries
            .values()
            .filter(|e| owned.contains(&e.institution_id) && e.is_lead())
            .count() as u64)
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let record = Notification {
            id: Uuid::new_v4().to_string(),
            title: notification.title,
            description: notification.description,
            category: notification.category,
            recipient: notification.recipient,
            institution_id: notification.institution_id,
            admin_id: notification.admin_id,
            student_id: notification.student_id,
            branch_id: notification.branch_id,
            metadata: notification.metadata,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().unwrap();
        inner.notifications.push(record.clone());
        Ok(record)
    }

    async fn get_student(&self, student_id: &str) -> StoreResult<Option<Student>> {
        Ok(self.inner.lock().unwrap().students.get(student_id).cloned())
    }

    async fn wishlist_toggle(
        &self,
        student_id: &str,
        course_id: &str,
        action: WishlistAction,
    ) -> StoreResult<WishlistOutcome> {
        // The whole toggle runs under one lock: both record writes land
        // together at the commit below, or not at all. Early returns
        // (no-ops, injected failures) leave the committed state alone
        // since only the scratch copies were touched.
        let mut inner = self.inner.lock().unwrap();

        let mut student = inner
            .students
            .get(student_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("student {}", student_id)))?;
        let old_course = inner
            .courses
            .get(course_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("course {}", course_id)))?;
        let mut course = old_course.clone();

        let outcome = match action {
            WishlistAction::Add => {
                if !student.wishlist.insert(course_id.to_string()) {
                    return Ok(WishlistOutcome::AlreadyPresent);
                }
                #[cfg(test)]
                inner.take_fail(WishlistFailPoint::AfterMembershipWrite)?;
                course.wishlist_count += 1;
                #[cfg(test)]
                inner.take_fail(WishlistFailPoint::AfterCounterAdjust)?;
                WishlistOutcome::Added
            }
            WishlistAction::Remove => {
                if !student.wishlist.remove(course_id) {
                    return Ok(WishlistOutcome::NotPresent);
                }
                #[cfg(test)]
                inner.take_fail(WishlistFailPoint::AfterMembershipWrite)?;
                course.wishlist_count = course.wishlist_count.saturating_sub(1);
                #[cfg(test)]
                inner.take_fail(WishlistFailPoint::AfterCounterAdjust)?;
                WishlistOutcome::Removed
            }
        };

        // Commit point.
        let changed_paths = course_changed_paths(&old_course, &course);
        inner.students.insert(student_id.to_string(), student);
        inner.courses.insert(course_id.to_string(), course.clone());
        if !changed_paths.is_empty() {
            inner.emit_course(ChangeEvent {
                operation: ChangeOperation::Update,
                document_id: course_id.to_string(),
                changed_paths,
                document: course,
            });
        }

        debug!(student_id, course_id, ?outcome, "wishlist toggle committed");
        Ok(outcome)
    }

    async fn expire_due_subscriptions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut expired = 0u64;
        for subscription in inner.subscriptions.values_mut() {
            if subscription.is_expirable(now) {
                subscription.status = edumart_models::SubscriptionStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    fn watch_courses(&self) -> BoxStream<'static, ChangeEvent<Course>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().course_watchers.push(tx);
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }

    fn watch_enquiries(&self) -> BoxStream<'static, ChangeEvent<Enquiry>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().enquiry_watchers.push(tx);
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }
}

/// Diff two course snapshots into dotted changed-field paths, matching
/// the serialized (camelCase) field names the watchers classify on.
fn course_changed_paths(old: &Course, new: &Course) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();

    if old.title != new.title {
        paths.insert("title".to_string());
    }
    if old.institution_id != new.institution_id {
        paths.insert("institutionId".to_string());
    }
    if old.course_views != new.course_views {
        paths.insert("courseViews".to_string());
    }
    if old.comparisons != new.comparisons {
        paths.insert("comparisons".to_string());
    }
    if old.wishlist_count != new.wishlist_count {
        paths.insert("wishlistCount".to_string());
    }

    for key in old.views_rollups.keys().chain(new.views_rollups.keys()) {
        if old.views_rollups.get(key) != new.views_rollups.get(key) {
            paths.insert(format!("viewsRollups.{}", key));
        }
    }
    for key in old
        .comparison_rollups
        .keys()
        .chain(new.comparison_rollups.keys())
    {
        if old.comparison_rollups.get(key) != new.comparison_rollups.get(key) {
            paths.insert(format!("comparisonRollups.{}", key));
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use edumart_models::{AccountRole, RecipientType, SubscriptionStatus};

    fn course(id: &str, institution_id: &str, views: i64) -> Course {
        Course {
            id: id.to_string(),
            institution_id: institution_id.to_string(),
            title: format!("Course {}", id),
            course_views: views,
            comparisons: 0,
            views_rollups: Default::default(),
            comparison_rollups: Default::default(),
            wishlist_count: 0,
        }
    }

    fn institution(id: &str, admin_id: Option<&str>) -> Institution {
        Institution {
            id: id.to_string(),
            name: format!("Institution {}", id),
            admin_id: admin_id.map(str::to_string),
        }
    }

    fn student(id: &str) -> Student {
        Student {
            id: id.to_string(),
            name: "Asha".to_string(),
            email: format!("{}@example.com", id),
            role: AccountRole::Student,
            wishlist: Default::default(),
        }
    }

    #[tokio::test]
    async fn wishlist_double_add_is_a_single_entry_and_single_increment() {
        let store = MemoryStore::new();
        store.insert_student(student("st1"));
        store.insert_course(course("c1", "i1", 0));

        let first = store
            .wishlist_toggle("st1", "c1", WishlistAction::Add)
            .await
            .unwrap();
        let second = store
            .wishlist_toggle("st1", "c1", WishlistAction::Add)
            .await
            .unwrap();

        assert_eq!(first, WishlistOutcome::Added);
        assert_eq!(second, WishlistOutcome::AlreadyPresent);
        assert_eq!(store.student("st1").unwrap().wishlist.len(), 1);
        assert_eq!(store.course("c1").unwrap().wishlist_count, 1);
    }

    #[tokio::test]
    async fn wishlist_remove_of_absent_entry_is_a_noop() {
        let store = MemoryStore::new();
        store.insert_student(student("st1"));
        store.insert_course(course("c1", "i1", 0));

        let outcome = store
            .wishlist_toggle("st1", "c1", WishlistAction::Remove)
            .await
            .unwrap();
        assert_eq!(outcome, WishlistOutcome::NotPresent);
        assert_eq!(store.course("c1").unwrap().wishlist_count, 0);
    }

    #[tokio::test]
    async fn wishlist_transaction_rolls_back_at_every_injection_point() {
        for point in [
            WishlistFailPoint::AfterMembershipWrite,
            WishlistFailPoint::AfterCounterAdjust,
        ] {
            let store = MemoryStore::new();
            store.insert_student(student("st1"));
            store.insert_course(course("c1", "i1", 0));

            store.fail_wishlist_once(point);
            let result = store.wishlist_toggle("st1", "c1", WishlistAction::Add).await;
            assert!(result.is_err(), "injection at {:?} must fail the toggle", point);

            // Neither the membership row nor the counter may survive.
            assert!(store.student("st1").unwrap().wishlist.is_empty());
            assert_eq!(store.course("c1").unwrap().wishlist_count, 0);

            // The transactional scope was released: the next toggle works.
            let outcome = store
                .wishlist_toggle("st1", "c1", WishlistAction::Add)
                .await
                .unwrap();
            assert_eq!(outcome, WishlistOutcome::Added);
        }
    }

    #[tokio::test]
    async fn admin_rollups_sum_over_all_owned_institutions() {
        let store = MemoryStore::new();
        store.insert_institution(institution("i1", Some("adm1")));
        store.insert_institution(institution("i2", Some("adm1")));
        store.insert_institution(institution("i3", Some("adm2")));
        store.insert_course(course("c1", "i1", 10));
        store.insert_course(course("c2", "i2", 5));
        store.insert_course(course("c3", "i3", 100));

        assert_eq!(store.sum_course_views("adm1").await.unwrap(), 15);
        assert_eq!(store.sum_course_views("adm2").await.unwrap(), 100);
        // Admin with no institutions: empty scope sums to zero.
        assert_eq!(store.sum_course_views("adm3").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lead_count_filters_by_type_case_insensitively() {
        let store = MemoryStore::new();
        store.insert_institution(institution("i1", Some("adm1")));
        for (id, kind) in [("e1", "Callback"), ("e2", "DEMO"), ("e3", "general")] {
            store.insert_enquiry(Enquiry {
                id: id.to_string(),
                institution_id: "i1".to_string(),
                course_id: None,
                student_name: "A".to_string(),
                email: "a@example.com".to_string(),
                phone: None,
                enquiry_type: kind.to_string(),
                message: None,
                created_at: Utc::now(),
            });
        }

        assert_eq!(store.count_leads("adm1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn subscription_sweep_is_idempotent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_subscription(Subscription {
            id: "s1".to_string(),
            institution_id: "i1".to_string(),
            plan: "premium".to_string(),
            status: SubscriptionStatus::Active,
            start_date: now - chrono::Duration::days(30),
            end_date: now - chrono::Duration::days(1),
        });
        store.insert_subscription(Subscription {
            id: "s2".to_string(),
            institution_id: "i1".to_string(),
            plan: "premium".to_string(),
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: now + chrono::Duration::days(30),
        });

        assert_eq!(store.expire_due_subscriptions(now).await.unwrap(), 1);
        assert_eq!(
            store.subscription("s1").unwrap().status,
            SubscriptionStatus::Expired
        );
        assert_eq!(
            store.subscription("s2").unwrap().status,
            SubscriptionStatus::Active
        );
        // Second run has nothing left to expire.
        assert_eq!(store.expire_due_subscriptions(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn course_updates_reach_watchers_with_diffed_paths() {
        use futures_util::StreamExt;

        let store = MemoryStore::new();
        store.insert_course(course("c1", "i1", 0));

        let mut stream = store.watch_courses();

        // Inserts are filtered out of the course stream.
        store.insert_course(course("c2", "i1", 0));

        store
            .update_course("c1", |c| {
                c.course_views += 1;
                c.views_rollups.insert("2026-08".to_string(), 1);
            })
            .unwrap();

        let event = stream.next().await.unwrap();
        assert_eq!(event.operation, ChangeOperation::Update);
        assert_eq!(event.document_id, "c1");
        assert!(event.path_changed("courseViews"));
        assert!(event.path_group_changed("viewsRollups"));
        assert!(!event.path_changed("comparisons"));
        assert_eq!(event.document.course_views, 1);
    }

    #[tokio::test]
    async fn replace_always_emits_even_without_field_changes() {
        use futures_util::StreamExt;

        let store = MemoryStore::new();
        let original = course("c1", "i1", 3);
        store.insert_course(original.clone());

        let mut stream = store.watch_courses();
        store.replace_course(original).unwrap();

        let event = stream.next().await.unwrap();
        assert_eq!(event.operation, ChangeOperation::Replace);
        assert!(event.changed_paths.is_empty());
    }

    #[tokio::test]
    async fn notification_insert_assigns_id_and_timestamp() {
        let store = MemoryStore::new();
        let record = store
            .insert_notification(NewNotification {
                title: "t".to_string(),
                description: "d".to_string(),
                category: "payment".to_string(),
                recipient: RecipientType::Student,
                institution_id: None,
                admin_id: None,
                student_id: Some("st1".to_string()),
                branch_id: None,
                metadata: serde_json::Value::Null,
            })
            .await
            .unwrap();

        assert!(!record.id.is_empty());
        assert_eq!(store.notifications().len(), 1);
    }
}
