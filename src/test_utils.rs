//! Shared test utilities for plateprefs
//!
//! This module provides common test fixtures and helper functions
//! used across multiple test modules.

#[cfg(test)]
pub mod test_helpers {
    use std::collections::{HashMap, VecDeque};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    use crate::chain::abi::{self, EventDescriptor};
    use crate::chain::types::keccak256;
    use crate::chain::{
        Address, ChainError, ChainGateway, ContractInterface, ErrorCallback, Log, Subscription,
        Token, TxHash,
    };
    use crate::suggestions::types::{DishSuggestion, SuggestionSet};
    use crate::suggestions::{GenerationRequest, ProviderError, SuggestionProvider};

    // =========================================================================
    // Local HTTP server
    // =========================================================================

    /// Minimal HTTP/1.1 server answering every request with JSON
    ///
    /// Aborted on drop.
    pub struct JsonServer {
        addr: SocketAddr,
        task: JoinHandle<()>,
        headers: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl JsonServer {
        pub fn url(&self) -> String {
            format!("http://{}", self.addr)
        }

        /// Value of the most recently received header called `name`
        pub fn header(&self, name: &str) -> Option<String> {
            self.headers
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(seen, _)| seen.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
        }
    }

    impl Drop for JsonServer {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    /// Start a server on a random local port
    ///
    /// `handler` receives the request target (path and query) and the JSON
    /// body (`Null` when empty) and returns a status code and JSON body.
    pub async fn spawn_json_server<F>(handler: F) -> JsonServer
    where
        F: Fn(&str, &Value) -> (u16, Value) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(handler);
        let headers = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&headers);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, handler.as_ref(), &seen).await;
                });
            }
        });

        JsonServer {
            addr,
            task,
            headers,
        }
    }

    async fn serve_connection<F>(
        stream: TcpStream,
        handler: &F,
        headers: &Mutex<Vec<(String, String)>>,
    ) -> std::io::Result<()>
    where
        F: Fn(&str, &Value) -> (u16, Value),
    {
        let mut reader = BufReader::new(stream);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;
        let target = request_line
            .split_whitespace()
            .nth(1)
            .unwrap_or("/")
            .to_string();

        let mut content_length = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
                headers
                    .lock()
                    .unwrap()
                    .push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

        let (status, response) = handler(&target, &request);
        let payload = response.to_string();
        let head = format!(
            "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            payload.len()
        );

        let mut stream = reader.into_inner();
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(payload.as_bytes()).await?;
        stream.shutdown().await
    }

    // =========================================================================
    // Suggestion fixtures
    // =========================================================================

    /// Model response text containing `count` dishes named "Dish 1".."Dish n"
    pub fn suggestions_json(count: usize) -> String {
        let dishes: Vec<Value> = (1..=count)
            .map(|i| {
                json!({
                    "dishName": format!("Dish {}", i),
                    "preparationTime": format!("Approx. {} minutes", i * 10),
                    "keyIngredients": ["salt", "water"],
                    "youtubeSearchQuery": format!("dish {} recipe", i),
                })
            })
            .collect();
        json!({ "suggestions": dishes }).to_string()
    }

    /// Valid set whose dishes are named "{name} 1".."{name} 3"
    pub fn suggestion_set(name: &str) -> SuggestionSet {
        let dishes = (1..=3)
            .map(|i| DishSuggestion {
                dish_name: format!("{} {}", name, i),
                preparation_time: "Approx. 30 minutes".to_string(),
                key_ingredients: vec![name.to_string()],
                youtube_search_query: format!("{} {} recipe", name, i),
            })
            .collect();
        SuggestionSet::new(dishes).unwrap()
    }

    /// Provider returning queued responses in order
    ///
    /// Once the queue is empty every call fails with a network error.
    pub struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl ScriptedProvider {
        pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                delay: None,
                last_request: Mutex::new(None),
            }
        }

        /// Sleep before answering each call
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<GenerationRequest> {
            self.last_request.lock().unwrap().clone()
        }
    }

    impl SuggestionProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "Scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| {
                Err(ProviderError::Network {
                    provider: "Scripted".to_string(),
                    message: "no scripted response left".to_string(),
                })
            })
        }
    }

    // =========================================================================
    // In-memory contract
    // =========================================================================

    #[derive(Default)]
    struct ContractState {
        records: HashMap<u64, (String, String)>,
        block_number: u64,
        read_error: Option<ChainError>,
        write_error: Option<ChainError>,
        subscribers: Vec<mpsc::Sender<Vec<Log>>>,
        error_callbacks: Vec<ErrorCallback>,
        reads: usize,
    }

    /// `UserPreferences` contract kept in memory
    ///
    /// Writes apply immediately and emit an update event to every live
    /// subscription.
    pub struct InMemoryContract {
        state: Mutex<ContractState>,
        interface: ContractInterface,
    }

    impl Default for InMemoryContract {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryContract {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(ContractState::default()),
                interface: ContractInterface::user_preferences(),
            }
        }

        /// Store a record without emitting an event
        pub fn set_raw(&self, fid: u64, country: &str, dietary_restrictions: &str) {
            self.state.lock().unwrap().records.insert(
                fid,
                (country.to_string(), dietary_restrictions.to_string()),
            );
        }

        pub fn fail_reads(&self, error: Option<ChainError>) {
            self.state.lock().unwrap().read_error = error;
        }

        pub fn fail_writes(&self, error: Option<ChainError>) {
            self.state.lock().unwrap().write_error = error;
        }

        pub fn reads(&self) -> usize {
            self.state.lock().unwrap().reads
        }

        /// Deliver a raw log batch to every subscriber
        pub fn emit(&self, logs: Vec<Log>) {
            self.state
                .lock()
                .unwrap()
                .subscribers
                .retain(|tx| tx.try_send(logs.clone()).is_ok());
        }

        /// Report a transport error to every subscriber's error callback
        pub fn report_watch_error(&self, message: &str) {
            let state = self.state.lock().unwrap();
            for callback in &state.error_callbacks {
                callback(ChainError::Watch {
                    event: "UserPreferencesUpdated".to_string(),
                    message: message.to_string(),
                });
            }
        }

        /// Encoded `UserPreferencesUpdated` log
        pub fn update_log(fid: u64, country: &str, dietary_restrictions: &str, block_number: u64) -> Log {
            let event = EventDescriptor::user_preferences_updated();
            let mut fid_topic = [0u8; 32];
            fid_topic[24..].copy_from_slice(&fid.to_be_bytes());

            Log {
                address: Address::default(),
                topics: vec![event.topic(), fid_topic],
                data: abi::encode(&[Token::from(country), Token::from(dietary_restrictions)]),
                block_number,
                log_index: 0,
                transaction_hash: Some(TxHash(keccak256(block_number.to_be_bytes()))),
            }
        }
    }

    impl ChainGateway for InMemoryContract {
        fn account(&self) -> Address {
            Address([0x11; 20])
        }

        async fn read(&self, function: &str, args: &[Token]) -> Result<Vec<Token>, ChainError> {
            let read_error = |message: String| ChainError::Read {
                function: function.to_string(),
                message,
            };
            self.interface
                .function(function)
                .and_then(|f| f.encode_call(args))
                .map_err(|e| read_error(e.to_string()))?;

            let mut state = self.state.lock().unwrap();
            state.reads += 1;
            if let Some(error) = state.read_error.clone() {
                return Err(error);
            }

            let fid = args.first().cloned().and_then(Token::into_uint).unwrap_or_default();
            let (country, diet) = state.records.get(&fid).cloned().unwrap_or_default();
            Ok(vec![Token::from(country), Token::from(diet)])
        }

        async fn write(&self, function: &str, args: &[Token]) -> Result<TxHash, ChainError> {
            self.interface
                .function(function)
                .and_then(|f| f.encode_call(args))
                .map_err(|e| ChainError::Simulation {
                    function: function.to_string(),
                    reason: e.to_string(),
                })?;

            let log = {
                let mut state = self.state.lock().unwrap();
                if let Some(error) = state.write_error.clone() {
                    return Err(error);
                }

                let mut values = args.iter().cloned();
                let fid = values.next().and_then(Token::into_uint).unwrap_or_default();
                let country = values.next().and_then(Token::into_string).unwrap_or_default();
                let diet = values.next().and_then(Token::into_string).unwrap_or_default();

                state.block_number += 1;
                state.records.insert(fid, (country.clone(), diet.clone()));
                Self::update_log(fid, &country, &diet, state.block_number)
            };

            let hash = log.transaction_hash.unwrap_or(TxHash([0; 32]));
            self.emit(vec![log]);
            Ok(hash)
        }

        fn subscribe(&self, event: &str, on_error: ErrorCallback) -> Result<Subscription, ChainError> {
            self.interface.event(event).map_err(|e| ChainError::Watch {
                event: event.to_string(),
                message: e.to_string(),
            })?;

            let (tx, rx) = mpsc::channel(16);
            let mut state = self.state.lock().unwrap();
            state.subscribers.push(tx);
            state.error_callbacks.push(on_error);
            Ok(Subscription::new(rx, CancellationToken::new()))
        }
    }
}
