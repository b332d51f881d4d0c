//! Constant-interval connection retry.

use std::time::Duration;

use log::{debug, info};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::{
   bluetooth::registry::DeviceHandle,
   error::{LinkError, Result},
};

/// Connects to `device`, retrying every `cooldown` until an attempt
/// succeeds or `cancel` fires.
///
/// There is no attempt limit and no backoff growth. Returns the number
/// of attempts it took.
pub async fn connect_until_success<D: DeviceHandle>(
   device: &D,
   cooldown: Duration,
   cancel: &CancellationToken,
) -> Result<u32> {
   let addr = device.address();
   info!("Attempting to connect to {addr} until it succeeds");

   let mut attempts = 0u32;
   loop {
      attempts = attempts.saturating_add(1);

      let result = select! {
         biased;
         () = cancel.cancelled() => return Err(LinkError::Cancelled),
         result = device.connect() => result,
      };

      match result {
         Ok(()) => {
            info!("Connected to {addr} after {attempts} attempt(s)");
            return Ok(attempts);
         },
         Err(e) => {
            debug!("Connection attempt {attempts} to {addr} failed: {e}, retrying in {cooldown:?}");
         },
      }

      select! {
         biased;
         () = cancel.cancelled() => return Err(LinkError::Cancelled),
         () = time::sleep(cooldown) => {},
      }
   }
}

#[cfg(test)]
mod tests {
   use std::sync::atomic::Ordering;

   use tokio::time::Instant;

   use super::*;
   use crate::bluetooth::testing::FakeDevice;

   const COOLDOWN: Duration = Duration::from_millis(50);

   #[tokio::test(start_paused = true)]
   async fn test_retries_with_constant_cooldown() {
      let device = FakeDevice::new(1, "speaker").failing(2);
      let cancel = CancellationToken::new();

      let start = Instant::now();
      let attempts = connect_until_success(&device, COOLDOWN, &cancel)
         .await
         .unwrap();
      let elapsed = start.elapsed();

      assert_eq!(attempts, 3);
      assert_eq!(device.connect_attempts.load(Ordering::SeqCst), 3);
      assert!(elapsed >= COOLDOWN * 2, "elapsed {elapsed:?}");
      assert!(elapsed < COOLDOWN * 3, "elapsed {elapsed:?}");
   }

   #[tokio::test(start_paused = true)]
   async fn test_first_success_needs_no_cooldown() {
      let device = FakeDevice::new(1, "speaker");
      let cancel = CancellationToken::new();

      let start = Instant::now();
      assert_eq!(connect_until_success(&device, COOLDOWN, &cancel).await.unwrap(), 1);
      assert!(start.elapsed() < COOLDOWN);
   }

   #[tokio::test(start_paused = true)]
   async fn test_cancel_stops_retrying() {
      let device = FakeDevice::new(1, "speaker").failing(u32::MAX);
      let cancel = CancellationToken::new();

      let canceller = cancel.clone();
      tokio::spawn(async move {
         time::sleep(COOLDOWN * 5 + COOLDOWN / 2).await;
         canceller.cancel();
      });

      let result = connect_until_success(&device, COOLDOWN, &cancel).await;
      assert!(matches!(result, Err(LinkError::Cancelled)));
      assert_eq!(device.connect_attempts.load(Ordering::SeqCst), 6);
   }

   #[tokio::test]
   async fn test_already_cancelled_makes_no_attempt() {
      let device = FakeDevice::new(1, "speaker");
      let cancel = CancellationToken::new();
      cancel.cancel();

      let result = connect_until_success(&device, COOLDOWN, &cancel).await;
      assert!(matches!(result, Err(LinkError::Cancelled)));
      assert_eq!(device.connect_attempts.load(Ordering::SeqCst), 0);
   }
}
