use log::warn;
use std::io::Read;
use std::time::Duration;

/// Cap on a single snapshot body, guards against a misbehaving endpoint
/// streaming forever.
const MAX_FRAME_BYTES: u64 = 8 * 1024 * 1024;

/// Fetches still snapshots from cabin camera endpoints.
///
/// Every failure mode (transport error, non-2xx status, empty body) is
/// reported as `None` rather than an error so a flaky camera cannot take
/// down the polling loop. The HTTP client is blocking; callers run `fetch`
/// on the blocking pool.
#[derive(Clone)]
pub struct FrameSource {
    agent: ureq::Agent,
}

impl FrameSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn fetch(&self, camera_url: &str) -> Option<Vec<u8>> {
        let response = match self.agent.get(camera_url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                warn!("Camera {camera_url} returned status {code}");
                return None;
            }
            Err(err) => {
                warn!("Failed to fetch frame from {camera_url}: {err}");
                return None;
            }
        };

        let mut bytes = Vec::new();
        if let Err(err) = response
            .into_reader()
            .take(MAX_FRAME_BYTES)
            .read_to_end(&mut bytes)
        {
            warn!("Failed to read frame body from {camera_url}: {err}");
            return None;
        }

        if bytes.is_empty() {
            warn!("Camera {camera_url} returned an empty body");
            return None;
        }

        Some(bytes)
    }
}
