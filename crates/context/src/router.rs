//! Agent Router
//!
//! Classifies each question, gathers grounding material from the aggregation
//! layer (generalist) or the lookup table (specialist), and hands it to the
//! composer. Callers always get a structured result; internal failures become
//! `success = false` with a safe message.

use crate::fact_sheet::FactSheet;
use crate::stream::{AnswerEvent, AnswerStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use switchyard_common::cancellation::CancellationToken;
use switchyard_common::config::AggregationConfig;
use switchyard_common::context::composer::referenced_passages;
use switchyard_common::context::{
    ClassificationResult, Composer, ComposerContext, CompositionRequest, ContextPassage,
    EntityLookup, QueryClassifier, Route,
};
use switchyard_common::errors::{AppError, Result};
use switchyard_common::metrics::{record_answer, record_classification};
use switchyard_common::models::{ChatTurn, Citation};
use switchyard_search::{Aggregator, SearchResult, SourceRegistry};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

pub const BLANK_QUESTION_MESSAGE: &str = "Please type a question and I'll look it up.";
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I couldn't put an answer together right now. Please try again in a moment.";
pub const CANCELLED_MESSAGE: &str = "The request was cancelled.";

const STREAM_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer_text: String,
    pub success: bool,
    pub cited_sources: Vec<Citation>,

    /// Path that produced the answer; None when nothing was attempted
    pub route: Option<Route>,
}

impl AskResponse {
    fn failure(message: &str, route: Option<Route>) -> Self {
        Self {
            answer_text: message.to_string(),
            success: false,
            cited_sources: Vec::new(),
            route,
        }
    }
}

/// Collaborators the router is constructed with
#[derive(Clone)]
pub struct RouterContext {
    pub registry: SourceRegistry,
    pub lookup: Arc<dyn EntityLookup>,
    pub classifier: Arc<QueryClassifier>,
    pub composer: Arc<dyn Composer>,
    pub aggregation: AggregationConfig,
}

/// Grounding material ready for the composer
struct Prepared {
    route: Route,
    request: CompositionRequest,
    /// Retrieved results, in passage order; empty on the specialist path
    results: Vec<SearchResult>,
    /// Specialist citations
    citations: Vec<Citation>,
}

impl Prepared {
    /// Passages the answer points at, or every passage when it points at none
    fn cite(&self, answer: &str) -> Vec<Citation> {
        if self.route == Route::Specialist {
            return self.citations.clone();
        }

        let referenced = referenced_passages(answer, self.results.len());
        let chosen: Vec<&SearchResult> = if referenced.is_empty() {
            self.results.iter().collect()
        } else {
            referenced.iter().map(|i| &self.results[i - 1]).collect()
        };

        chosen
            .into_iter()
            .map(|r| Citation {
                source: r.source.clone(),
                reference: r.item.id.clone(),
                title: r.item.title.clone(),
                url: r.item.url.clone(),
            })
            .collect()
    }
}

pub struct Router {
    ctx: RouterContext,
    aggregator: Aggregator,
}

impl Router {
    pub fn new(ctx: RouterContext) -> Self {
        let aggregator = ctx.registry.aggregator(&ctx.aggregation, &[]);
        Self { ctx, aggregator }
    }

    pub fn context(&self) -> &RouterContext {
        &self.ctx
    }

    /// Classify without answering
    pub fn classify(&self, question: &str) -> ClassificationResult {
        let result = self.ctx.classifier.classify(question, self.ctx.lookup.as_ref());
        record_classification(
            result.route.as_str(),
            result.rule.as_deref().unwrap_or("default"),
        );
        debug!(
            route = result.route.as_str(),
            rule = ?result.rule,
            evidence = ?result.evidence,
            "Query classified"
        );
        result
    }

    pub async fn ask(&self, question: &str, history: &[ChatTurn]) -> AskResponse {
        self.ask_with_cancel(question, history, &CancellationToken::new())
            .await
    }

    #[instrument(skip(self, history, cancel), fields(history = history.len()))]
    pub async fn ask_with_cancel(
        &self,
        question: &str,
        history: &[ChatTurn],
        cancel: &CancellationToken,
    ) -> AskResponse {
        if question.trim().is_empty() {
            return AskResponse::failure(BLANK_QUESTION_MESSAGE, None);
        }

        let started = Instant::now();
        let classification = self.classify(question);

        let work = async {
            let prepared = self.prepare(question, history, &classification).await?;
            let answer = self.ctx.composer.compose(&prepared.request).await?;
            Ok::<_, AppError>((prepared.cite(&answer), prepared.route, answer))
        };

        let (response, outcome) = match cancel.run(work).await {
            Ok(Ok((cited_sources, route, answer_text))) => (
                AskResponse {
                    answer_text,
                    success: true,
                    cited_sources,
                    route: Some(route),
                },
                "success",
            ),
            Ok(Err(e)) => {
                error!(error = %e, code = ?e.code(), "Answer failed, returning fallback");
                (AskResponse::failure(FALLBACK_MESSAGE, Some(classification.route)), "failed")
            }
            Err(_) => {
                info!("Answer cancelled by caller");
                (AskResponse::failure(CANCELLED_MESSAGE, Some(classification.route)), "cancelled")
            }
        };

        let route = response.route.unwrap_or(classification.route);
        record_answer(started.elapsed().as_secs_f64(), route.as_str(), "single", outcome);
        response
    }

    pub fn ask_streaming(self: &Arc<Self>, question: String, history: Vec<ChatTurn>) -> AnswerStream {
        self.ask_streaming_with_cancel(question, history, CancellationToken::new())
    }

    /// Stream the answer. The generalist path forwards composer fragments as
    /// they arrive; the specialist path emits the full answer as one fragment.
    pub fn ask_streaming_with_cancel(
        self: &Arc<Self>,
        question: String,
        history: Vec<ChatTurn>,
        cancel: CancellationToken,
    ) -> AnswerStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let stream = AnswerStream::new(rx, cancel.clone());
        let router = Arc::clone(self);

        tokio::spawn(async move {
            let terminal = router.stream_answer(&question, &history, &cancel, &tx).await;
            // Receiver may already be gone; nothing left to tell it.
            let _ = tx.send(terminal).await;
        });

        stream
    }

    /// Runs the streaming answer and returns its terminal event
    #[instrument(skip_all)]
    async fn stream_answer(
        &self,
        question: &str,
        history: &[ChatTurn],
        cancel: &CancellationToken,
        tx: &mpsc::Sender<AnswerEvent>,
    ) -> AnswerEvent {
        if question.trim().is_empty() {
            return AnswerEvent::Failed {
                message: BLANK_QUESTION_MESSAGE.to_string(),
            };
        }

        let started = Instant::now();
        let classification = self.classify(question);

        let work = async {
            let prepared = self.prepare(question, history, &classification).await?;

            let answer = match prepared.route {
                Route::Specialist => {
                    let answer = self.ctx.composer.compose(&prepared.request).await?;
                    send(tx, answer.clone()).await?;
                    answer
                }
                Route::Generalist => {
                    let mut fragments = self.ctx.composer.compose_stream(&prepared.request).await?;
                    let mut answer = String::new();
                    while let Some(fragment) = fragments.next().await {
                        let fragment = fragment?;
                        answer.push_str(&fragment);
                        send(tx, fragment).await?;
                    }
                    answer
                }
            };

            Ok::<_, AppError>(AnswerEvent::Completed {
                cited_sources: prepared.cite(&answer),
                route: prepared.route,
            })
        };

        let (event, outcome) = match cancel.run(work).await {
            Ok(Ok(event)) => (event, "success"),
            Ok(Err(AppError::Cancelled)) | Err(_) => {
                info!("Streaming answer cancelled");
                (AnswerEvent::Cancelled, "cancelled")
            }
            Ok(Err(e)) => {
                error!(error = %e, code = ?e.code(), "Streaming answer failed, returning fallback");
                (
                    AnswerEvent::Failed {
                        message: FALLBACK_MESSAGE.to_string(),
                    },
                    "failed",
                )
            }
        };

        let route = match &event {
            AnswerEvent::Completed { route, .. } => *route,
            _ => classification.route,
        };
        record_answer(started.elapsed().as_secs_f64(), route.as_str(), "stream", outcome);
        event
    }

    /// Gather grounding material for the classified route
    async fn prepare(
        &self,
        question: &str,
        history: &[ChatTurn],
        classification: &ClassificationResult,
    ) -> Result<Prepared> {
        if classification.route == Route::Specialist {
            let sheet = self.fact_sheet(&classification.verified_codes)?;
            if !sheet.is_empty() {
                return Ok(Prepared {
                    route: Route::Specialist,
                    request: CompositionRequest {
                        question: question.to_string(),
                        history: history.to_vec(),
                        context: ComposerContext::FactSheet(sheet.markdown),
                    },
                    results: Vec::new(),
                    citations: sheet.citations,
                });
            }
            debug!(
                rule = ?classification.rule,
                "Specialist route without resolvable codes, using aggregated retrieval"
            );
        }

        let aggregated = self
            .aggregator
            .search_all(
                question,
                self.ctx.aggregation.per_source_k,
                self.ctx.aggregation.total_cap,
            )
            .await;

        let passages = aggregated
            .results
            .iter()
            .map(|r| ContextPassage {
                source: r.source.clone(),
                reference: r.item.id.clone(),
                title: r.item.title.clone(),
                content: r.item.body.clone(),
                score: r.score,
            })
            .collect();

        Ok(Prepared {
            route: Route::Generalist,
            request: CompositionRequest {
                question: question.to_string(),
                history: history.to_vec(),
                context: ComposerContext::Retrieved(passages),
            },
            results: aggregated.results,
            citations: Vec::new(),
        })
    }

    /// Resolve verified codes into a fact sheet; a lookup error fails the answer
    fn fact_sheet(&self, codes: &[String]) -> Result<FactSheet> {
        let mut entities = Vec::with_capacity(codes.len());
        for code in codes {
            match self.ctx.lookup.get_entity(code)? {
                Some(entity) => entities.push(entity),
                None => warn!(code = %code, "Verified code vanished from lookup table"),
            }
        }
        Ok(FactSheet::build(&entities))
    }
}

async fn send(tx: &mpsc::Sender<AnswerEvent>, text: String) -> Result<()> {
    tx.send(AnswerEvent::Fragment { text })
        .await
        .map_err(|_| AppError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use std::sync::Mutex;
    use std::time::Duration;
    use switchyard_common::config::{AppConfig, ClassifierConfig};
    use switchyard_common::context::composer::FragmentStream;
    use switchyard_common::context::{CrossReference, LookupEntity, LookupTable};
    use switchyard_common::embeddings::{Embedder, HashedEmbedder};
    use switchyard_common::models::{KnowledgeItem, SourceKind};
    use switchyard_search::{KnowledgeConnector, MemoryStore};

    /// Replays fixed fragments and records every request
    #[derive(Default)]
    struct ScriptedComposer {
        fragments: Vec<String>,
        fail: bool,
        delay: Duration,
        requests: Mutex<Vec<CompositionRequest>>,
    }

    impl ScriptedComposer {
        fn replying(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| f.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_context(&self) -> ComposerContext {
            self.requests.lock().unwrap().last().unwrap().context.clone()
        }

        async fn run(&self, request: &CompositionRequest) -> Result<Vec<String>> {
            self.requests.lock().unwrap().push(request.clone());
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(AppError::CompositionError {
                    message: "model overloaded".to_string(),
                });
            }
            Ok(self.fragments.clone())
        }
    }

    #[async_trait]
    impl Composer for ScriptedComposer {
        async fn compose(&self, request: &CompositionRequest) -> Result<String> {
            Ok(self.run(request).await?.concat())
        }

        async fn compose_stream(&self, request: &CompositionRequest) -> Result<FragmentStream> {
            let fragments = self.run(request).await?;
            Ok(stream::iter(fragments.into_iter().map(Ok)).boxed())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Never finishes embedding a query
    struct StalledEmbedder;

    #[async_trait]
    impl Embedder for StalledEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![0.0; 4])
        }

        fn model_name(&self) -> &str {
            "stalled"
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    /// Claims every code exists but cannot serve any of them
    struct BrokenLookup;

    impl EntityLookup for BrokenLookup {
        fn get_entity(&self, _code: &str) -> Result<Option<LookupEntity>> {
            Err(AppError::LookupUnavailable {
                message: "table offline".to_string(),
            })
        }

        fn contains(&self, _code: &str) -> bool {
            true
        }
    }

    fn lookup() -> LookupTable {
        let role = |code: &str, includes: &[&str]| LookupEntity {
            code: code.to_string(),
            entity_type: "role".to_string(),
            description: format!("Role {}", code),
            cross_references: includes
                .iter()
                .map(|c| CrossReference {
                    relation: "includes".to_string(),
                    code: c.to_string(),
                })
                .collect(),
        };
        LookupTable::from_entities([role("SY01", &["SU01", "PFCG"]), role("SY02", &["SU53"])])
            .unwrap()
    }

    fn helpdesk_items() -> Vec<KnowledgeItem> {
        vec![
            KnowledgeItem::new("kb-1", "Reset VPN password", "Open the VPN client and choose reset."),
            KnowledgeItem::new("kb-2", "Printer offline fix", "Power cycle the printer."),
        ]
    }

    async fn registry(embedder: Arc<dyn Embedder>, items: Vec<KnowledgeItem>) -> SourceRegistry {
        let store = MemoryStore::with_items(items);
        let mut registry = SourceRegistry::new();
        registry
            .register(Arc::new(KnowledgeConnector::new(
                "wiki",
                SourceKind::Articles,
                Arc::new(store),
                embedder,
            )))
            .unwrap();
        registry.initialize_all().await;
        registry
    }

    async fn router_with(
        composer: Arc<ScriptedComposer>,
        lookup: Arc<dyn EntityLookup>,
        embedder: Arc<dyn Embedder>,
        items: Vec<KnowledgeItem>,
    ) -> Arc<Router> {
        let config = AppConfig::default();
        Arc::new(Router::new(RouterContext {
            registry: registry(embedder, items).await,
            lookup,
            classifier: Arc::new(QueryClassifier::new(&ClassifierConfig::default()).unwrap()),
            composer,
            aggregation: config.aggregation,
        }))
    }

    async fn router(composer: Arc<ScriptedComposer>) -> Arc<Router> {
        router_with(
            composer,
            Arc::new(lookup()),
            Arc::new(HashedEmbedder::new(64)),
            helpdesk_items(),
        )
        .await
    }

    async fn events(stream: AnswerStream) -> Vec<AnswerEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_blank_question_touches_nothing() {
        let composer = Arc::new(ScriptedComposer::replying(&["unused"]));
        let router = router(composer.clone()).await;

        let response = router.ask("   ", &[]).await;
        assert!(!response.success);
        assert_eq!(response.answer_text, BLANK_QUESTION_MESSAGE);
        assert_eq!(composer.calls(), 0);
    }

    #[tokio::test]
    async fn test_generalist_answer_cites_referenced_passage() {
        let composer = Arc::new(ScriptedComposer::replying(&["Use the VPN client reset [1]."]));
        let router = router(composer.clone()).await;

        let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];
        let response = router.ask("how do I reset my VPN password", &history).await;

        assert!(response.success);
        assert_eq!(response.route, Some(Route::Generalist));
        assert_eq!(response.cited_sources.len(), 1);
        assert_eq!(response.cited_sources[0].reference, "kb-1");
        assert_eq!(response.cited_sources[0].source, "wiki");

        match composer.last_context() {
            ComposerContext::Retrieved(passages) => assert_eq!(passages[0].reference, "kb-1"),
            other => panic!("unexpected context {:?}", other),
        }
        assert_eq!(composer.requests.lock().unwrap()[0].history, history);
    }

    #[tokio::test]
    async fn test_unreferenced_answer_cites_all_passages() {
        let composer = Arc::new(ScriptedComposer::replying(&["Try turning it off and on."]));
        let router = router(composer).await;

        let response = router.ask("printer is offline", &[]).await;
        assert_eq!(response.cited_sources.len(), 2);
    }

    #[tokio::test]
    async fn test_specialist_answer_uses_fact_sheet() {
        let composer = Arc::new(ScriptedComposer::replying(&["SY01 includes SU01 and PFCG."]));
        let router = router(composer.clone()).await;

        let response = router.ask("what transactions does role SY01 include", &[]).await;

        assert!(response.success);
        assert_eq!(response.route, Some(Route::Specialist));
        assert_eq!(response.cited_sources[0].reference, "SY01");
        match composer.last_context() {
            ComposerContext::FactSheet(sheet) => {
                assert!(sheet.contains("**SY01**"));
                assert!(!sheet.contains('|'));
            }
            other => panic!("unexpected context {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_roles_get_comparison_table() {
        let composer = Arc::new(ScriptedComposer::replying(&["They differ."]));
        let router = router(composer.clone()).await;

        let response = router.ask("compare SY01 and SY02", &[]).await;
        assert_eq!(response.cited_sources.len(), 2);
        match composer.last_context() {
            ComposerContext::FactSheet(sheet) => assert!(sheet.contains("| Code | Description | includes |")),
            other => panic!("unexpected context {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_keyword_without_codes_falls_back_to_retrieval() {
        let composer = Arc::new(ScriptedComposer::replying(&["See the wiki."]));
        let router = router(composer.clone()).await;

        let response = router.ask("which tcode resets a VPN password", &[]).await;
        assert!(response.success);
        assert_eq!(response.route, Some(Route::Generalist));
        assert!(matches!(composer.last_context(), ComposerContext::Retrieved(_)));
    }

    #[tokio::test]
    async fn test_composer_failure_is_safe() {
        let composer = Arc::new(ScriptedComposer {
            fail: true,
            ..Default::default()
        });
        let router = router(composer).await;

        let response = router.ask("how do I reset my VPN password", &[]).await;
        assert!(!response.success);
        assert_eq!(response.answer_text, FALLBACK_MESSAGE);
        assert!(response.cited_sources.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_unavailable_is_safe() {
        let composer = Arc::new(ScriptedComposer::replying(&["unused"]));
        let router = router_with(
            composer.clone(),
            Arc::new(BrokenLookup),
            Arc::new(HashedEmbedder::new(64)),
            helpdesk_items(),
        )
        .await;

        let response = router.ask("what does role SY01 include", &[]).await;
        assert!(!response.success);
        assert_eq!(response.answer_text, FALLBACK_MESSAGE);
        assert_eq!(composer.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_single_shot() {
        let composer = Arc::new(ScriptedComposer {
            fragments: vec!["late".to_string()],
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let router = router(composer).await;

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let response = router.ask_with_cancel("printer offline", &[], &token).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!response.success);
        assert_eq!(response.answer_text, CANCELLED_MESSAGE);
    }

    #[tokio::test]
    async fn test_streaming_generalist_forwards_fragments() {
        let composer = Arc::new(ScriptedComposer::replying(&["Open the ", "VPN client [1]."]));
        let router = router(composer).await;

        let events = events(router.ask_streaming("reset my VPN password".to_string(), vec![])).await;

        assert_eq!(
            events[..2],
            [
                AnswerEvent::Fragment { text: "Open the ".to_string() },
                AnswerEvent::Fragment { text: "VPN client [1].".to_string() },
            ]
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        match events.last().unwrap() {
            AnswerEvent::Completed { cited_sources, route } => {
                assert_eq!(*route, Route::Generalist);
                assert_eq!(cited_sources[0].reference, "kb-1");
            }
            other => panic!("unexpected terminal {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_streaming_specialist_is_single_chunk() {
        let composer = Arc::new(ScriptedComposer::replying(&["SY01 ", "includes SU01."]));
        let router = router(composer).await;

        let (text, terminal) = router
            .ask_streaming("what transactions does role SY01 include".to_string(), vec![])
            .collect_answer()
            .await;
        assert_eq!(text, "SY01 includes SU01.");

        let events = events(
            router.ask_streaming("what transactions does role SY01 include".to_string(), vec![]),
        )
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(terminal, Some(AnswerEvent::Completed { route: Route::Specialist, .. })));
    }

    #[tokio::test]
    async fn test_streaming_failure_terminal() {
        let composer = Arc::new(ScriptedComposer {
            fail: true,
            ..Default::default()
        });
        let router = router(composer).await;

        let events = events(router.ask_streaming("printer offline".to_string(), vec![])).await;
        assert_eq!(
            events,
            vec![AnswerEvent::Failed {
                message: FALLBACK_MESSAGE.to_string()
            }]
        );

        let blank = events_of(&router, " ").await;
        assert_eq!(blank.len(), 1);
        assert!(matches!(blank[0], AnswerEvent::Failed { .. }));
    }

    async fn events_of(router: &Arc<Router>, question: &str) -> Vec<AnswerEvent> {
        events(router.ask_streaming(question.to_string(), vec![])).await
    }

    #[tokio::test]
    async fn test_streaming_cancel_discards_partial_aggregation() {
        let composer = Arc::new(ScriptedComposer::replying(&["never"]));
        // empty source so initialization never reaches the stalled embedder
        let router =
            router_with(composer.clone(), Arc::new(lookup()), Arc::new(StalledEmbedder), vec![]).await;

        let stream = router.ask_streaming("printer offline".to_string(), vec![]);
        let handle = stream.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let events = events(stream).await;
        assert_eq!(events, vec![AnswerEvent::Cancelled]);
        assert_eq!(composer.calls(), 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels() {
        let composer = Arc::new(ScriptedComposer::replying(&["never"]));
        let router =
            router_with(composer, Arc::new(lookup()), Arc::new(StalledEmbedder), vec![]).await;

        let token = CancellationToken::new();
        let stream =
            router.ask_streaming_with_cancel("printer offline".to_string(), vec![], token.clone());
        drop(stream);
        assert!(token.is_cancelled());
    }
}
