//! Typed client for a [`GridEngine`] living behind a [`Bridge`].

use std::convert::Infallible;
use std::future::Future;

use conway::{GridConstraints, GridEngine, RandomSource, Renderer};

use crate::bridge::{Bridge, PropertyWatch, WorkerOptions};
use crate::error::BridgeError;
use crate::kernel::{MethodTable, Service};

impl<R: RandomSource + 'static> Service for GridEngine<R> {
    fn register(methods: &mut MethodTable<Self>) {
        methods
            .method("reset", |engine, _| {
                engine.reset();
                Ok::<_, Infallible>(())
            })
            .method("randomize", |engine, _| {
                engine.randomize();
                Ok::<_, Infallible>(())
            })
            .method("tick", |engine, _| {
                engine.tick();
                Ok::<_, Infallible>(())
            })
            .method("get_generation", |engine, _| Ok::<_, Infallible>(engine.generation()))
            .property(
                "state",
                |engine| engine.state().to_vec(),
                |engine, state: Vec<i32>| {
                    engine.set_state(state);
                    Ok::<_, Infallible>(())
                },
            )
            .property(
                "constraints",
                |engine| *engine.constraints(),
                |engine, constraints: GridConstraints| engine.set_constraints(constraints),
            );
    }
}

/// Asynchronous board operations consumed by renderers and UI code.
pub trait BoardService {
    fn reset(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;
    fn randomize(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;
    fn tick(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;
    /// A copy of the current buffer.
    fn state(&self) -> impl Future<Output = Result<Vec<i32>, BridgeError>> + Send;
    fn set_state(&self, state: Vec<i32>) -> impl Future<Output = Result<(), BridgeError>> + Send;
    fn constraints(&self) -> impl Future<Output = Result<GridConstraints, BridgeError>> + Send;
    fn set_constraints(
        &self,
        constraints: GridConstraints,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
    fn generation(&self) -> impl Future<Output = Result<u64, BridgeError>> + Send;
}

/// Stub forwarding [`BoardService`] calls to an engine on a worker thread.
pub struct BoardClient {
    bridge: Bridge,
}

impl BoardClient {
    pub fn spawn(constraints: GridConstraints, options: WorkerOptions) -> Result<Self, BridgeError> {
        Self::with_engine(GridEngine::new(constraints), options)
    }

    /// Hosts a pre-built engine, e.g. one with a seeded random source.
    pub fn with_engine<R>(engine: GridEngine<R>, options: WorkerOptions) -> Result<Self, BridgeError>
    where
        R: RandomSource + Send + 'static,
    {
        let bridge = Bridge::spawn(move |_| engine, options)?;
        Ok(Self { bridge })
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Constraints written through `set_constraints` from now on.
    pub fn watch_constraints(&self) -> PropertyWatch {
        self.bridge.observe("constraints")
    }

    pub fn terminate(&mut self) {
        self.bridge.terminate();
    }
}

impl BoardService for BoardClient {
    fn reset(&self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.bridge.call("reset", Vec::new()).decode()
    }

    fn randomize(&self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.bridge.call("randomize", Vec::new()).decode()
    }

    fn tick(&self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.bridge.call("tick", Vec::new()).decode()
    }

    fn state(&self) -> impl Future<Output = Result<Vec<i32>, BridgeError>> + Send {
        self.bridge.get("state").decode()
    }

    fn set_state(&self, state: Vec<i32>) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.bridge.set("state", state).decode()
    }

    fn constraints(&self) -> impl Future<Output = Result<GridConstraints, BridgeError>> + Send {
        self.bridge.get("constraints").decode()
    }

    fn set_constraints(
        &self,
        constraints: GridConstraints,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.bridge.set("constraints", constraints).decode()
    }

    fn generation(&self) -> impl Future<Output = Result<u64, BridgeError>> + Send {
        self.bridge.call("get_generation", Vec::new()).decode()
    }
}

/// Fetches a consistent-enough snapshot and hands it to `renderer`.
///
/// Both reads are issued together; a tick landing between them is possible
/// and callers that care must sequence their own calls.
pub async fn render_board<B, T>(board: &B, renderer: &mut T) -> Result<(), BridgeError>
where
    B: BoardService,
    T: Renderer + ?Sized,
{
    let (constraints, state) = tokio::try_join!(board.constraints(), board.state())?;
    renderer.render(&state, &constraints);
    Ok(())
}
