// In-memory stand-ins for the real backends, for driving the handlers in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{BackendError, FileStorage, PostDatabase, PresignedUpload, SessionResolver};
use crate::posts::{
    Category, NewPost, PageRequest, PostCounts, PostDetails, PostImage, PostListFilter, Tag,
    Visibility,
};
use crate::server_state::Config;
use crate::user::{SessionIdentity, User};

#[derive(Clone, Debug)]
pub struct StoredPost {
    pub id: i32,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub tags: Vec<Tag>,
    pub visibility: Visibility,
    pub is_draft: bool,
    pub cover_image: Option<String>,
    pub is_processing: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    sessions: HashMap<String, String>,
    posts: Vec<StoredPost>,
    images: Vec<PostImage>,
    follows: HashSet<(i64, i64)>,
    likes: Vec<i32>,
    comments: Vec<i32>,
    next_post_id: i32,
    next_image_id: i32,
}

#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
    fail_finalize: AtomicBool,
    failing_image_names: Mutex<HashSet<String>>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, id: i64, email: &str, username: &str) -> User {
        let user = User {
            id,
            email: email.to_string(),
            username: username.to_string(),
            avatar: Some(format!("https://avatars.example/{username}.png")),
        };
        self.tables.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn add_session(&self, session_id: &str, email: &str) {
        self.tables
            .lock()
            .unwrap()
            .sessions
            .insert(session_id.to_string(), email.to_string());
    }

    pub fn add_follow(&self, follower_id: i64, followee_id: i64) {
        self.tables
            .lock()
            .unwrap()
            .follows
            .insert((follower_id, followee_id));
    }

    pub fn add_like(&self, post_id: i32) {
        self.tables.lock().unwrap().likes.push(post_id);
    }

    pub fn add_comment(&self, post_id: i32) {
        self.tables.lock().unwrap().comments.push(post_id);
    }

    /// Drops a finished post straight into the table. Returns its id.
    pub fn seed_post(
        &self,
        owner_id: i64,
        visibility: Visibility,
        is_draft: bool,
        created_at: DateTime<Utc>,
    ) -> i32 {
        let mut tables = self.tables.lock().unwrap();
        tables.next_post_id += 1;
        let id = tables.next_post_id;

        tables.posts.push(StoredPost {
            id,
            owner_id,
            title: format!("Post {id}"),
            description: "Seeded".to_string(),
            category: Category::Art,
            tags: Vec::new(),
            visibility,
            is_draft,
            cover_image: None,
            is_processing: false,
            created_at,
        });

        id
    }

    /// Makes the next finalize_post call blow up.
    pub fn fail_finalize(&self) {
        self.fail_finalize.store(true, Ordering::SeqCst);
    }

    /// Recording an image whose URL ends in this file name will fail.
    pub fn fail_image_inserts_for(&self, file_name: &str) {
        self.failing_image_names
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    pub fn posts(&self) -> Vec<StoredPost> {
        self.tables.lock().unwrap().posts.clone()
    }

    pub fn images(&self) -> Vec<PostImage> {
        self.tables.lock().unwrap().images.clone()
    }

    pub fn set_post_processing(&self, post_id: i32, created_at: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(post) = tables.posts.iter_mut().find(|post| post.id == post_id) {
            post.is_processing = true;
            post.created_at = created_at;
        }
    }
}

impl Tables {
    fn admits(&self, filter: &PostListFilter, post: &StoredPost) -> bool {
        if post.is_draft || post.is_processing {
            return false;
        }
        if filter.category.is_some_and(|category| category != post.category) {
            return false;
        }
        if filter.owner_id.is_some_and(|owner_id| owner_id != post.owner_id) {
            return false;
        }
        if filter.visibility.is_some_and(|visibility| visibility != post.visibility) {
            return false;
        }

        match filter.viewer_id {
            None => true,
            Some(viewer_id) => {
                post.visibility == Visibility::Public
                    || post.owner_id == viewer_id
                    || (post.visibility == Visibility::Followers
                        && self.follows.contains(&(viewer_id, post.owner_id)))
            }
        }
    }

    fn details(&self, post: &StoredPost) -> Result<PostDetails, BackendError> {
        let owner = self
            .users
            .iter()
            .find(|user| user.id == post.owner_id)
            .ok_or_else(|| BackendError::InvalidRow(format!("post {} has no owner", post.id)))?;

        Ok(PostDetails {
            id: post.id,
            title: post.title.clone(),
            description: post.description.clone(),
            category: post.category,
            tags: post.tags.clone(),
            visibility: post.visibility,
            is_draft: post.is_draft,
            cover_image: post.cover_image.clone(),
            owner_id: post.owner_id,
            created_at: post.created_at,
            owner: owner.summary(),
            images: self
                .images
                .iter()
                .filter(|image| image.post_id == post.id)
                .cloned()
                .collect(),
            counts: PostCounts {
                likes: self.likes.iter().filter(|id| **id == post.id).count() as i64,
                comments: self.comments.iter().filter(|id| **id == post.id).count() as i64,
            },
        })
    }
}

#[async_trait]
impl SessionResolver for MemoryDatabase {
    async fn resolve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionIdentity>, BackendError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .sessions
            .get(session_id)
            .map(|email| SessionIdentity {
                email: email.clone(),
            }))
    }
}

#[async_trait]
impl PostDatabase for MemoryDatabase {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, BackendError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn insert_post(&self, new_post: &NewPost) -> Result<i32, BackendError> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_post_id += 1;
        let id = tables.next_post_id;

        tables.posts.push(StoredPost {
            id,
            owner_id: new_post.owner_id,
            title: new_post.title.clone(),
            description: new_post.description.clone(),
            category: new_post.category,
            tags: new_post.tags.clone(),
            visibility: new_post.visibility,
            is_draft: new_post.is_draft,
            cover_image: None,
            is_processing: true,
            created_at: Utc::now(),
        });

        Ok(id)
    }

    async fn insert_image(
        &self,
        post_id: i32,
        url: &str,
        description: Option<&str>,
    ) -> Result<PostImage, BackendError> {
        let should_fail = self
            .failing_image_names
            .lock()
            .unwrap()
            .iter()
            .any(|file_name| url.ends_with(&format!("/{file_name}")));

        if should_fail {
            return Err(BackendError::InvalidRow(format!("simulated failure recording {url}")));
        }

        let mut tables = self.tables.lock().unwrap();
        tables.next_image_id += 1;

        let image = PostImage {
            id: tables.next_image_id,
            url: url.to_string(),
            description: description.map(str::to_string),
            post_id,
        };
        tables.images.push(image.clone());

        Ok(image)
    }

    async fn finalize_post(
        &self,
        post_id: i32,
        cover_image: Option<&str>,
    ) -> Result<(), BackendError> {
        if self.fail_finalize.swap(false, Ordering::SeqCst) {
            return Err(BackendError::InvalidRow("simulated finalize failure".to_string()));
        }

        let mut tables = self.tables.lock().unwrap();
        let post = tables
            .posts
            .iter_mut()
            .find(|post| post.id == post_id)
            .ok_or_else(|| BackendError::InvalidRow(format!("no post {post_id}")))?;

        post.cover_image = cover_image.map(str::to_string);
        post.is_processing = false;

        Ok(())
    }

    async fn delete_post(&self, post_id: i32) -> Result<(), BackendError> {
        let mut tables = self.tables.lock().unwrap();
        tables.posts.retain(|post| post.id != post_id);
        tables.images.retain(|image| image.post_id != post_id);
        Ok(())
    }

    async fn get_post_details(&self, post_id: i32) -> Result<Option<PostDetails>, BackendError> {
        let tables = self.tables.lock().unwrap();
        tables
            .posts
            .iter()
            .find(|post| post.id == post_id)
            .map(|post| tables.details(post))
            .transpose()
    }

    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest,
    ) -> Result<(Vec<PostDetails>, i64), BackendError> {
        let tables = self.tables.lock().unwrap();

        let mut matching: Vec<&StoredPost> = tables
            .posts
            .iter()
            .filter(|post| tables.admits(filter, post))
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;

        let posts = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .map(|post| tables.details(post))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((posts, total))
    }

    async fn delete_stale_processing_posts(
        &self,
        older_than: Duration,
    ) -> Result<u64, BackendError> {
        let cutoff = Utc::now() - older_than;
        let mut tables = self.tables.lock().unwrap();

        let stale_ids: Vec<i32> = tables
            .posts
            .iter()
            .filter(|post| post.is_processing && post.created_at < cutoff)
            .map(|post| post.id)
            .collect();

        tables.posts.retain(|post| !stale_ids.contains(&post.id));
        tables.images.retain(|image| !stale_ids.contains(&image.post_id));

        Ok(stale_ids.len() as u64)
    }
}

/// A bucket that is just a set of keys.
pub struct MemoryStorage {
    config: Arc<Config>,
    objects: Mutex<HashSet<String>>,
    failing_temp_keys: Mutex<HashSet<String>>,
    move_delay: Mutex<Option<StdDuration>>,
}

impl MemoryStorage {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self {
            config,
            objects: Mutex::new(HashSet::new()),
            failing_temp_keys: Mutex::new(HashSet::new()),
            move_delay: Mutex::new(None),
        })
    }

    pub fn put(&self, key: &str) {
        self.objects.lock().unwrap().insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains(key)
    }

    /// Every move takes this long before doing anything.
    pub fn slow_moves(&self, delay: StdDuration) {
        *self.move_delay.lock().unwrap() = Some(delay);
    }

    /// Moving this temp key will fail.
    pub fn fail_moves_of(&self, temp_key: &str) {
        self.failing_temp_keys
            .lock()
            .unwrap()
            .insert(temp_key.to_string());
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn move_from_temp(&self, temp_key: &str, final_key: &str) -> Result<String, BackendError> {
        let move_delay = *self.move_delay.lock().unwrap();
        if let Some(delay) = move_delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_temp_keys.lock().unwrap().contains(temp_key) {
            return Err(BackendError::Storage(format!("simulated failure moving {temp_key}")));
        }

        let mut objects = self.objects.lock().unwrap();
        if !objects.remove(temp_key) {
            return Err(BackendError::Storage(format!("no such key {temp_key}")));
        }
        objects.insert(final_key.to_string());

        Ok(self.config.public_url(final_key))
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), BackendError> {
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn presign_temp_uploads(
        &self,
        temp_keys: &[String],
    ) -> Result<Vec<PresignedUpload>, BackendError> {
        Ok(temp_keys
            .iter()
            .map(|key| PresignedUpload {
                key: key.clone(),
                url: format!("{}?signature=test", self.config.public_url(key)),
            })
            .collect())
    }
}
