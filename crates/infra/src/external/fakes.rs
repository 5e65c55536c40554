//! In-test doubles for the external adapters.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::crypto::{CredentialDecryptor, DecryptError, EncryptedSecret, SecretString};
use super::publishing::{MediaId, PostPayload, PublishError, PublishingClient, RemotePost, TargetCredentials};

pub(crate) struct FakeDecryptor {
    ready: bool,
    result: Result<String, DecryptError>,
    pub calls: AtomicUsize,
}

impl FakeDecryptor {
    pub fn ready(plaintext: &str) -> Self {
        Self {
            ready: true,
            result: Ok(plaintext.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            ready: false,
            result: Err(DecryptError::NotConfigured("no decrypt endpoint".into())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: DecryptError) -> Self {
        Self {
            ready: true,
            result: Err(err),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialDecryptor for FakeDecryptor {
    fn ensure_ready(&self) -> Result<(), DecryptError> {
        if self.ready {
            Ok(())
        } else {
            Err(DecryptError::NotConfigured("no decrypt endpoint".into()))
        }
    }

    async fn decrypt(&self, _secret: &EncryptedSecret) -> Result<SecretString, DecryptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map(SecretString::new)
    }
}

/// Records calls; succeeds unless told otherwise.
pub(crate) struct FakePublisher {
    pub posts: Mutex<Vec<(String, PostPayload)>>,
    pub uploads: AtomicUsize,
    pub upload_error: Option<PublishError>,
    /// Post creation fails for titles in this list.
    pub reject_titles: Vec<String>,
    /// Post creation panics for titles in this list.
    pub panic_titles: Vec<String>,
}

impl Default for FakePublisher {
    fn default() -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            uploads: AtomicUsize::new(0),
            upload_error: None,
            reject_titles: Vec::new(),
            panic_titles: Vec::new(),
        }
    }
}

impl FakePublisher {
    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn last_post(&self) -> Option<(String, PostPayload)> {
        self.posts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PublishingClient for FakePublisher {
    async fn upload_media(
        &self,
        _credentials: &TargetCredentials,
        _image_url: &str,
    ) -> Result<MediaId, PublishError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) as u64;
        match &self.upload_error {
            Some(err) => Err(err.clone()),
            None => Ok(MediaId(100 + n)),
        }
    }

    async fn create_post(
        &self,
        credentials: &TargetCredentials,
        payload: &PostPayload,
    ) -> Result<RemotePost, PublishError> {
        if self.panic_titles.contains(&payload.title) {
            panic!("publisher blew up on {}", payload.title);
        }
        if self.reject_titles.contains(&payload.title) {
            return Err(PublishError::Api(401, "rest_cannot_create".into()));
        }

        let mut posts = self.posts.lock().unwrap();
        posts.push((credentials.password.expose().to_string(), payload.clone()));
        let id = posts.len();
        Ok(RemotePost {
            id: id.to_string(),
            link: Some(format!("{}/?p={id}", credentials.site_url)),
        })
    }
}
