use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    errors::StoreError,
    models::{CompletedChunk, MultipartStore},
};

#[derive(Debug)]
struct Session {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<(String, String), Vec<u8>>,
    sessions: HashMap<String, Session>,
    part_sizes: Vec<(i32, usize)>,
    next_upload_id: u64,
    aborted: usize,
    puts: usize,
}

/// An in-process bucket store. Holds objects in memory and can be told to
/// fail or delay specific parts.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: HashSet<String>,
    state: Mutex<State>,
    fail_part: Option<i32>,
    fail_complete: bool,
    reject_credentials: bool,
    part_delays: HashMap<i32, Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Counts one running `upload_part` call, including calls dropped mid-await.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let running = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(running, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    /// A store that only knows `buckets`; anything else is reported as missing.
    pub fn new<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MemoryStore {
            buckets: buckets.into_iter().map(Into::into).collect(),
            state: Mutex::new(State::default()),
            fail_part: None,
            fail_complete: false,
            reject_credentials: false,
            part_delays: HashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Makes every upload of `part_number` fail.
    pub fn failing_part(mut self, part_number: i32) -> Self {
        self.fail_part = Some(part_number);
        self
    }

    /// Makes `complete_multipart_upload` fail after every part has arrived.
    pub fn failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    /// Answers every call except aborts with [`StoreError::Auth`].
    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    /// Holds `part_number` for `delay` before accepting it.
    pub fn delaying_part(mut self, part_number: i32, delay: Duration) -> Self {
        self.part_delays.insert(part_number, delay);
        self
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Sizes of every part received, in arrival order.
    pub fn part_sizes(&self) -> Vec<(i32, usize)> {
        self.lock().part_sizes.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn aborted_sessions(&self) -> usize {
        self.lock().aborted
    }

    pub fn single_puts(&self) -> usize {
        self.lock().puts
    }

    /// Number of `upload_part` calls running right now.
    pub fn parts_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of `upload_part` calls seen running at once.
    pub fn max_parts_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        if self.reject_credentials {
            return Err(StoreError::Auth {
                reason: format!("s3://{bucket}: InvalidAccessKeyId"),
            });
        }
        if self.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                bucket: bucket.to_string(),
            })
        }
    }
}

#[async_trait]
impl MultipartStore for MemoryStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.check_bucket(bucket)?;
        let mut state = self.lock();
        state.puts += 1;
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, StoreError> {
        self.check_bucket(bucket)?;
        let mut state = self.lock();
        state.next_upload_id += 1;
        let upload_id = format!("upload-{}", state.next_upload_id);
        state.sessions.insert(
            upload_id.clone(),
            Session {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<CompletedChunk, StoreError> {
        let _in_flight = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.check_bucket(bucket)?;

        if let Some(delay) = self.part_delays.get(&part_number) {
            tokio::time::sleep(*delay).await;
        }

        if self.fail_part == Some(part_number) {
            Err(StoreError::transfer(
                bucket,
                key,
                format!("injected failure on part {part_number}"),
            ))
        } else {
            let mut state = self.lock();
            state.part_sizes.push((part_number, body.len()));
            match state.sessions.get_mut(upload_id) {
                Some(session) => {
                    session.parts.insert(part_number, body);
                    Ok(CompletedChunk {
                        part_number,
                        e_tag: format!("\"{upload_id}-{part_number}\""),
                    })
                }
                None => Err(StoreError::transfer(
                    bucket,
                    key,
                    format!("no such upload {upload_id}"),
                )),
            }
        }
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedChunk>,
    ) -> Result<(), StoreError> {
        self.check_bucket(bucket)?;
        if self.fail_complete {
            return Err(StoreError::transfer(
                bucket,
                key,
                "injected failure completing the upload",
            ));
        }
        let mut state = self.lock();
        let mut session = state
            .sessions
            .remove(upload_id)
            .ok_or_else(|| StoreError::transfer(bucket, key, format!("no such upload {upload_id}")))?;

        let mut body = Vec::new();
        let mut previous = 0;
        for part in &parts {
            if part.part_number <= previous {
                return Err(StoreError::transfer(
                    bucket,
                    key,
                    "parts must be listed in ascending order",
                ));
            }
            previous = part.part_number;
            let data = session.parts.remove(&part.part_number).ok_or_else(|| {
                StoreError::transfer(bucket, key, format!("part {} was never uploaded", part.part_number))
            })?;
            body.extend_from_slice(&data);
        }

        state.objects.insert((session.bucket, session.key), body);
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.sessions.remove(upload_id);
        state.aborted += 1;
        Ok(())
    }
}
