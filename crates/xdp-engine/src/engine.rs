//! XDP 필터 엔진 — 프로그램 로드/어태치, 룰 맵 관리, 통계 폴링
//!
//! [`FilterEngine`]은 XDP 판정 프로그램의 전체 라이프사이클을 관리합니다.
//! 빌더 패턴([`FilterEngineBuilder`])으로 생성하며, [`Pipeline`] trait을 구현합니다.
//!
//! # 아키텍처
//! ```text
//! ┌──────────────┐  set/insert  ┌──────────────────────┐
//! │ FilterEngine │─────────────▶│ ACL_RULES /          │
//! │ (userspace)  │              │ RATE_LIMITS (maps)   │
//! └──────┬───────┘              └──────────┬───────────┘
//!        │ spawn                           │ lookup
//!        ▼                                 ▼
//!  counter poller ◀── RATE_LIMITS    ┌──────────────┐
//!  stats poller   ◀── VERDICT_STATS ◀│ XDP program  │
//!                                    │ (kernel)     │
//!                                    └──────────────┘
//! ```
//!
//! # 사용 예시
//! ```ignore
//! let mut engine = FilterEngine::builder()
//!     .config(EngineConfig::from_core(&config.xdp)?)
//!     .build()?;
//!
//! engine.start().await?;
//! engine.reload_rules("/etc/ironfence/rules.toml").await?;
//! engine.stop().await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ironfence_core::error::{IronfenceError, PipelineError};
use ironfence_core::metrics as m;
use ironfence_core::pipeline::{HealthStatus, Pipeline};
use ironfence_xdp_common::{ACL_MAX_ENTRIES, AclRule, RateLimitRule};

use crate::config::{EngineConfig, FilterMode, RuleFile};
use crate::stats::VerdictMetrics;

/// 모드별로 컴파일된 룰
#[derive(Clone)]
pub enum CompiledRules {
    /// 우선순위 순 ACL 엔트리
    Acl(Vec<AclRule>),
    /// 인덱스 순 레이트 리밋 엔트리
    RateLimit(Vec<RateLimitRule>),
}

impl CompiledRules {
    /// 룰 파일에서 모드에 해당하는 테이블만 컴파일합니다.
    pub fn compile(rules: &RuleFile, mode: FilterMode) -> Result<Self, IronfenceError> {
        Ok(match mode {
            FilterMode::Acl => Self::Acl(rules.compile_acl()?),
            FilterMode::RateLimit => Self::RateLimit(rules.compile_rate_limits()?),
        })
    }

    /// 엔트리 수
    pub fn len(&self) -> usize {
        match self {
            Self::Acl(rules) => rules.len(),
            Self::RateLimit(rules) => rules.len(),
        }
    }

    /// 엔트리가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 메트릭 레이블용 테이블 이름
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Acl(_) => FilterMode::Acl.as_str(),
            Self::RateLimit(_) => FilterMode::RateLimit.as_str(),
        }
    }
}

/// ACL 맵의 전체 슬롯 내용을 인덱스 순으로 만듭니다.
///
/// 컴파일된 엔트리 뒤에 센티널(제로 엔트리)이 오고, 남은 꼬리도 모두 0으로 채워
/// 이전 룰 집합의 잔여 엔트리가 남지 않게 합니다.
pub fn acl_slots(rules: &[AclRule]) -> impl Iterator<Item = (u32, AclRule)> + '_ {
    (0..ACL_MAX_ENTRIES).map(move |index| {
        let rule = rules
            .get(index as usize)
            .copied()
            .unwrap_or_else(AclRule::zeroed);
        (index, rule)
    })
}

/// 레이트 리밋 맵에 기록할 키와 제거할 키를 계산합니다.
///
/// 키는 `0..n`으로 연속이어야 합니다. 커널 스캔은 첫 빈 키에서 멈춥니다.
pub fn rate_limit_plan(
    rules: &[RateLimitRule],
    existing: &[u32],
) -> (Vec<(u32, RateLimitRule)>, Vec<u32>) {
    let writes: Vec<(u32, RateLimitRule)> = (0u32..)
        .zip(rules.iter().copied())
        .collect();
    let len = writes.len();
    let mut stale: Vec<u32> = existing
        .iter()
        .copied()
        .filter(|key| *key as usize >= len)
        .collect();
    stale.sort_unstable();
    stale.dedup();
    (writes, stale)
}

/// 실패한 작업의 에러를 돌려주고, 정리 단계의 실패는 로그로만 남깁니다.
fn rollback_error(
    primary: IronfenceError,
    cleanup: Result<(), IronfenceError>,
) -> IronfenceError {
    if let Err(e) = cleanup {
        warn!(error = %e, cause = %primary, "cleanup after failed start also failed");
    }
    primary
}

/// XDP 필터 엔진
///
/// # 필드
/// - `config`: 엔진 설정 (인터페이스, 모드, 폴링 주기)
/// - `rules`: 마지막으로 컴파일된 룰
/// - `cancel`: 백그라운드 폴러 취소 토큰
/// - `tasks`: 폴러 태스크 핸들
/// - `verdicts`: 판정 통계 (폴러와 공유)
///
/// # Linux 전용
/// `aya::Ebpf` 핸들은 Linux에서만 사용 가능합니다.
/// 그 외 플랫폼에서는 `start()`가 `EngineError::ProgramLoad`를 반환합니다.
pub struct FilterEngine {
    config: EngineConfig,
    rules: Option<CompiledRules>,
    running: bool,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    verdicts: Arc<Mutex<VerdictMetrics>>,
    #[cfg(target_os = "linux")]
    loaded: Option<linux::Loaded>,
}

/// XDP 필터 엔진 빌더
pub struct FilterEngineBuilder {
    config: Option<EngineConfig>,
    rules: Option<RuleFile>,
}

impl FilterEngineBuilder {
    fn new() -> Self {
        Self {
            config: None,
            rules: None,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 룰을 직접 지정합니다.
    ///
    /// 지정하지 않으면 `start()` 시 `rules_path`에서 로드합니다.
    pub fn rules(mut self, rules: RuleFile) -> Self {
        self.rules = Some(rules);
        self
    }

    /// 엔진을 생성합니다.
    ///
    /// # 에러
    /// - `PipelineError::InitFailed`: 설정이 누락된 경우
    /// - `EngineError::Rule`: 지정한 룰이 컴파일되지 않는 경우
    pub fn build(self) -> Result<FilterEngine, IronfenceError> {
        let config = self
            .config
            .ok_or_else(|| PipelineError::InitFailed("config is required".to_owned()))?;

        let rules = self
            .rules
            .map(|rules| CompiledRules::compile(&rules, config.mode))
            .transpose()?;

        Ok(FilterEngine {
            config,
            rules,
            running: false,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            verdicts: Arc::new(Mutex::new(VerdictMetrics::new())),
            #[cfg(target_os = "linux")]
            loaded: None,
        })
    }
}

impl FilterEngine {
    /// 빌더를 반환합니다.
    pub fn builder() -> FilterEngineBuilder {
        FilterEngineBuilder::new()
    }

    /// 현재 설정을 반환합니다.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 마지막으로 컴파일된 룰을 반환합니다.
    pub fn rules(&self) -> Option<&CompiledRules> {
        self.rules.as_ref()
    }

    /// 실행 중인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 판정 통계 스냅샷을 반환합니다.
    pub async fn verdict_metrics(&self) -> VerdictMetrics {
        self.verdicts.lock().await.clone()
    }

    /// 룰 파일을 다시 읽어 컴파일하고, 실행 중이면 커널 테이블을 다시 씁니다.
    ///
    /// 컴파일에 실패하면 기존 룰이 그대로 유지됩니다.
    pub async fn reload_rules(&mut self, path: impl AsRef<Path>) -> Result<usize, IronfenceError> {
        let path = path.as_ref();
        let file = RuleFile::load(path).await?;
        let compiled = CompiledRules::compile(&file, self.config.mode)?;
        let count = compiled.len();

        if self.running {
            self.write_rules(&compiled).await?;
        }
        self.rules = Some(compiled);

        info!(
            path = %path.display(),
            mode = %self.config.mode,
            rules = count,
            "rules reloaded"
        );
        Ok(count)
    }

    /// 백그라운드 폴러를 취소하고 종료를 기다립니다.
    async fn stop_tasks(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "poller task ended abnormally");
            }
        }
        self.cancel = CancellationToken::new();
    }

    fn record_rules_loaded(rules: &CompiledRules) {
        #[allow(clippy::cast_precision_loss)]
        let count = rules.len() as f64;
        metrics::gauge!(m::RULES_LOADED, m::LABEL_TABLE => rules.table_name()).set(count);
    }
}

#[cfg(target_os = "linux")]
impl FilterEngine {
    /// XDP 오브젝트를 로드하고 프로그램을 인터페이스에 어태치합니다.
    fn load_and_attach(&mut self) -> Result<(), IronfenceError> {
        self.loaded = Some(linux::Loaded::attach(&self.config)?);
        Ok(())
    }

    /// 프로그램을 디태치하고 맵 핸들을 해제합니다.
    fn detach(&mut self) -> Result<(), IronfenceError> {
        match self.loaded.take() {
            Some(loaded) => loaded.detach(),
            None => Ok(()),
        }
    }

    /// 컴파일된 룰을 커널 테이블에 씁니다.
    async fn write_rules(&mut self, rules: &CompiledRules) -> Result<(), IronfenceError> {
        let maps = self
            .loaded
            .as_ref()
            .map(linux::Loaded::rule_maps)
            .ok_or(PipelineError::NotRunning)?;
        maps.write(rules).await?;
        Self::record_rules_loaded(rules);
        Ok(())
    }

    fn spawn_pollers(&mut self) {
        let Some(loaded) = self.loaded.as_ref() else {
            return;
        };
        if let Some(task) = loaded.spawn_counter_poller(&self.config, self.cancel.clone()) {
            self.tasks.push(task);
        }
        self.tasks.push(loaded.spawn_stats_poller(
            &self.config,
            Arc::clone(&self.verdicts),
            self.cancel.clone(),
        ));
    }
}

#[cfg(not(target_os = "linux"))]
impl FilterEngine {
    /// XDP 프로그램을 로드합니다 (비-Linux 스텁).
    fn load_and_attach(&mut self) -> Result<(), IronfenceError> {
        Err(ironfence_core::error::EngineError::ProgramLoad(
            "XDP is only supported on Linux".to_owned(),
        )
        .into())
    }

    fn detach(&mut self) -> Result<(), IronfenceError> {
        Ok(())
    }

    async fn write_rules(&mut self, rules: &CompiledRules) -> Result<(), IronfenceError> {
        Self::record_rules_loaded(rules);
        Ok(())
    }

    fn spawn_pollers(&mut self) {}
}

impl Pipeline for FilterEngine {
    /// XDP 프로그램을 로드하고 엔진을 시작합니다.
    ///
    /// 1. 룰 로드 및 컴파일 (빌더에서 지정하지 않은 경우)
    /// 2. XDP 프로그램 로드 및 인터페이스 어태치
    /// 3. 룰을 커널 테이블에 기록
    /// 4. 카운터/통계 폴러 스폰
    async fn start(&mut self) -> Result<(), IronfenceError> {
        if self.running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let rules = match self.rules.clone() {
            Some(rules) => rules,
            None => {
                let file = RuleFile::load(&self.config.base.rules_path).await?;
                let compiled = CompiledRules::compile(&file, self.config.mode)?;
                self.rules = Some(compiled.clone());
                compiled
            }
        };

        info!(
            interface = self.config.base.interface.as_str(),
            xdp_mode = self.config.base.xdp_mode.as_str(),
            mode = %self.config.mode,
            rules = rules.len(),
            "starting XDP filter engine"
        );

        self.load_and_attach()?;
        if let Err(e) = self.write_rules(&rules).await {
            return Err(rollback_error(e, self.detach()));
        }
        self.spawn_pollers();

        self.running = true;
        Ok(())
    }

    /// 엔진을 정지하고 리소스를 정리합니다.
    ///
    /// 1. 폴러 취소
    /// 2. XDP 프로그램 디태치
    /// 3. 통계 리셋
    async fn stop(&mut self) -> Result<(), IronfenceError> {
        if !self.running {
            return Err(PipelineError::NotRunning.into());
        }

        info!(
            interface = self.config.base.interface.as_str(),
            "stopping XDP filter engine"
        );

        self.stop_tasks().await;
        self.detach()?;
        self.verdicts.lock().await.reset();
        self.running = false;
        Ok(())
    }

    /// 엔진의 현재 상태를 확인합니다.
    async fn health_check(&self) -> HealthStatus {
        if !self.running {
            return HealthStatus::Unhealthy("not running".to_owned());
        }

        let exited = self.tasks.iter().filter(|task| task.is_finished()).count();
        if exited > 0 {
            return HealthStatus::Degraded(format!("{exited} poller task(s) exited"));
        }

        HealthStatus::Healthy
    }
}

// =============================================================================
// Linux: aya 로더 및 폴러
// =============================================================================

#[cfg(target_os = "linux")]
mod linux {
    use std::sync::Arc;
    use std::time::Duration;

    use aya::Ebpf;
    use aya::maps::{Array, HashMap, MapData, MapError, PerCpuArray};
    use aya::programs::{ProgramError, Xdp, XdpFlags, xdp::XdpLinkId};
    use aya_log::EbpfLogger;
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, info, warn};

    use ironfence_core::error::{EngineError, IronfenceError};
    use ironfence_xdp_common::{
        AclRule, MAP_ACL_RULES, MAP_RATE_LIMITS, MAP_VERDICT_STATS, RATE_LIMIT_MAX_ENTRIES,
        RateLimitRule, VerdictStats,
    };

    use super::{CompiledRules, acl_slots, rate_limit_plan};
    use crate::config::{EngineConfig, FilterMode};
    use crate::stats::{CounterTracker, VerdictMetrics, VerdictSnapshot};

    type AclMap = Array<MapData, AclRule>;
    type RateLimitMap = HashMap<MapData, u32, RateLimitRule>;
    type StatsMap = PerCpuArray<MapData, VerdictStats>;

    /// 모드별 룰 맵 핸들
    #[derive(Clone)]
    pub(super) enum RuleMaps {
        Acl(Arc<Mutex<AclMap>>),
        RateLimit(Arc<Mutex<RateLimitMap>>),
    }

    /// 로드/어태치된 XDP 오브젝트
    pub(super) struct Loaded {
        bpf: Ebpf,
        program: &'static str,
        link: XdpLinkId,
        rules: RuleMaps,
        stats: Arc<Mutex<StatsMap>>,
    }

    fn xdp_flags(mode: &str) -> XdpFlags {
        match mode {
            "native" => XdpFlags::DRV_MODE,
            "hw" => XdpFlags::HW_MODE,
            _ => XdpFlags::SKB_MODE,
        }
    }

    fn map_err(e: MapError) -> IronfenceError {
        EngineError::Map(e.to_string()).into()
    }

    fn program<'a>(bpf: &'a mut Ebpf, name: &str) -> Result<&'a mut Xdp, IronfenceError> {
        let program = bpf
            .program_mut(name)
            .ok_or_else(|| EngineError::ProgramLoad(format!("program '{name}' not found")))?;
        program
            .try_into()
            .map_err(|e: ProgramError| EngineError::ProgramLoad(e.to_string()).into())
    }

    impl Loaded {
        pub(super) fn attach(config: &EngineConfig) -> Result<Self, IronfenceError> {
            let mut bpf = Ebpf::load_file(&config.base.program_path)
                .map_err(|e| EngineError::ProgramLoad(e.to_string()))?;

            if let Err(e) = EbpfLogger::init(&mut bpf) {
                // 오브젝트에 로그 호출이 없으면 실패하므로 경고만 남김
                warn!(error = %e, "failed to initialize eBPF logger");
            }

            let name = config.mode.program_name();
            let xdp = program(&mut bpf, name)?;
            xdp.load()
                .map_err(|e| EngineError::ProgramLoad(e.to_string()))?;
            let link = xdp
                .attach(&config.base.interface, xdp_flags(&config.base.xdp_mode))
                .map_err(|e| {
                    EngineError::Attach(format!("{}: {e}", config.base.interface))
                })?;

            info!(
                interface = config.base.interface.as_str(),
                program = name,
                "attached XDP program"
            );

            let rules = match config.mode {
                FilterMode::Acl => RuleMaps::Acl(Arc::new(Mutex::new(take_map(
                    &mut bpf,
                    MAP_ACL_RULES,
                )?))),
                FilterMode::RateLimit => RuleMaps::RateLimit(Arc::new(Mutex::new(take_map(
                    &mut bpf,
                    MAP_RATE_LIMITS,
                )?))),
            };
            let stats = Arc::new(Mutex::new(take_map(&mut bpf, MAP_VERDICT_STATS)?));

            Ok(Self {
                bpf,
                program: name,
                link,
                rules,
                stats,
            })
        }

        pub(super) fn detach(mut self) -> Result<(), IronfenceError> {
            let xdp = program(&mut self.bpf, self.program)?;
            xdp.detach(self.link)
                .map_err(|e| EngineError::Attach(e.to_string()))?;
            info!(program = self.program, "detached XDP program");
            Ok(())
        }

        pub(super) fn rule_maps(&self) -> RuleMaps {
            self.rules.clone()
        }

        /// 레이트 리밋 카운터 폴러. ACL 모드에서는 `None`입니다.
        pub(super) fn spawn_counter_poller(
            &self,
            config: &EngineConfig,
            cancel: CancellationToken,
        ) -> Option<JoinHandle<()>> {
            let RuleMaps::RateLimit(map) = &self.rules else {
                return None;
            };
            let map = Arc::clone(map);
            let period = Duration::from_millis(config.base.counter_poll_interval_ms);

            Some(tokio::spawn(async move {
                let mut tracker = CounterTracker::new();
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = interval.tick() => {}
                    }

                    let map = map.lock().await;
                    let mut seen = 0;
                    for index in 0..RATE_LIMIT_MAX_ENTRIES {
                        match map.get(&index, 0) {
                            Ok(rule) => {
                                tracker.observe(index, &rule);
                                seen += 1;
                            }
                            Err(MapError::KeyNotFound) => break,
                            Err(e) => {
                                warn!(rule = index, error = %e, "failed to read rate limit entry");
                                break;
                            }
                        }
                    }
                    tracker.truncate(seen);
                }
                debug!("counter poller stopped");
            }))
        }

        pub(super) fn spawn_stats_poller(
            &self,
            config: &EngineConfig,
            verdicts: Arc<Mutex<VerdictMetrics>>,
            cancel: CancellationToken,
        ) -> JoinHandle<()> {
            let map = Arc::clone(&self.stats);
            let period = Duration::from_secs(config.base.stats_poll_interval_secs);

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = interval.tick() => {}
                    }

                    let values = match map.lock().await.get(&0, 0) {
                        Ok(values) => values,
                        Err(e) => {
                            warn!(error = %e, "failed to read verdict stats");
                            continue;
                        }
                    };
                    verdicts
                        .lock()
                        .await
                        .update(VerdictSnapshot::sum(values.iter()));
                }
                debug!("stats poller stopped");
            })
        }
    }

    impl RuleMaps {
        pub(super) async fn write(&self, rules: &CompiledRules) -> Result<(), IronfenceError> {
            match (self, rules) {
                (RuleMaps::Acl(map), CompiledRules::Acl(rules)) => {
                    let mut map = map.lock().await;
                    for (index, rule) in acl_slots(rules) {
                        map.set(index, rule, 0).map_err(map_err)?;
                    }
                }
                (RuleMaps::RateLimit(map), CompiledRules::RateLimit(rules)) => {
                    let mut map = map.lock().await;
                    let existing = map
                        .keys()
                        .collect::<Result<Vec<u32>, MapError>>()
                        .map_err(map_err)?;
                    let (writes, stale) = rate_limit_plan(rules, &existing);
                    for (key, rule) in writes {
                        map.insert(key, rule, 0).map_err(map_err)?;
                    }
                    for key in stale {
                        map.remove(&key).map_err(map_err)?;
                    }
                }
                _ => {
                    return Err(EngineError::Rule(format!(
                        "compiled {} rules do not match the loaded program",
                        rules.table_name()
                    ))
                    .into());
                }
            }
            debug!(table = rules.table_name(), rules = rules.len(), "rule table written");
            Ok(())
        }
    }

    fn take_map<T>(bpf: &mut Ebpf, name: &str) -> Result<T, IronfenceError>
    where
        T: TryFrom<aya::maps::Map, Error = MapError>,
    {
        let map = bpf
            .take_map(name)
            .ok_or_else(|| EngineError::Map(format!("map '{name}' not found")))?;
        T::try_from(map).map_err(map_err)
    }
}
