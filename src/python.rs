//! Python bindings for the engine (feature = "python").

use crate::core::particle::DIM;
use crate::core::{
    Boundary, Cadence, CollisionScheduler, EventOutcome, HybridStepDriver,
    MetropolisMomentumResample, MomentumResample,
};
use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Python-facing wrapper around the event-driven engine.
///
/// - `__new__(num_particles, box_size, radius=1.0, mass=1.0,
///   periodic=False, seed=None)`
/// - `step()`, `run_events(n)`, `advance_to(time)`
/// - `get_positions()` / `get_velocities()` -> np.ndarray, shape (N, 3)
/// - `set_positions(arr)` / `set_velocities(arr)` (resynchronizes)
/// - `enable_momentum_resample(every_events, temperature, metropolis=False)`
#[pyclass(unsendable)]
pub struct HardSim {
    driver: HybridStepDriver,
}

#[pymethods]
impl HardSim {
    /// Build a dilute hard-sphere gas in an axis-aligned 3D box.
    ///
    /// Errors: raises ValueError on invalid parameters or an overlapping
    /// initial configuration.
    #[new]
    #[pyo3(signature = (num_particles, box_size, radius=1.0, mass=1.0, periodic=false, seed=None))]
    fn new(
        num_particles: usize,
        box_size: Vec<f64>,
        radius: f64,
        mass: f64,
        periodic: bool,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        if box_size.len() != DIM {
            return Err(py_err(format!("box_size must have length {DIM}")));
        }
        let mut lengths = [0.0_f64; DIM];
        lengths.copy_from_slice(&box_size);
        let boundary = if periodic {
            Boundary::periodic(lengths)
        } else {
            Boundary::reflecting(lengths)
        }
        .map_err(py_err)?;
        let scheduler = CollisionScheduler::random_gas(num_particles, boundary, radius, mass, seed)
            .map_err(py_err)?;
        Ok(Self {
            driver: HybridStepDriver::new(scheduler, seed),
        })
    }

    /// Recompute energies and rebuild the event horizon. Raises ValueError
    /// on a hard-core overlap; the configuration must be corrected before
    /// resetting again.
    fn reset(&mut self) -> PyResult<()> {
        self.driver.reset().map_err(py_err)
    }

    /// Resolve the next event. Returns False when nothing is pending.
    fn step(&mut self) -> PyResult<bool> {
        let outcome = self.driver.step().map_err(py_err)?;
        Ok(outcome != EventOutcome::NonePending)
    }

    /// Resolve up to `n` events (releases the GIL). Returns the number of
    /// events actually resolved.
    fn run_events(&mut self, py: Python<'_>, n: u64) -> PyResult<u64> {
        py.detach(|| self.driver.run_events(n)).map_err(py_err)
    }

    /// Advance to the given absolute time (releases the GIL).
    fn advance_to(&mut self, py: Python<'_>, target_time: f64) -> PyResult<()> {
        py.detach(|| self.driver.advance_to(target_time))
            .map_err(py_err)
    }

    /// Current simulation time.
    fn current_time(&self) -> f64 {
        self.driver.current_time()
    }

    /// Total kinetic energy.
    fn kinetic_energy(&self) -> f64 {
        self.driver.scheduler().current_kinetic_energy()
    }

    /// Potential energy (inf signals a hard-core overlap).
    fn potential_energy(&self) -> f64 {
        self.driver.scheduler().current_potential_energy()
    }

    /// Instantaneous kinetic temperature, 2K / (3N), reduced units.
    fn kinetic_temperature(&self) -> f64 {
        self.driver.scheduler().kinetic_temperature()
    }

    /// Positions as a NumPy array of shape (N, 3), dtype=float64.
    fn get_positions<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let particles = self.driver.scheduler().particles();
        let mut arr = Array2::<f64>::zeros((particles.len(), DIM));
        for (i, p) in particles.iter().enumerate() {
            for k in 0..DIM {
                arr[[i, k]] = p.r[k];
            }
        }
        Ok(arr.into_pyarray(py).unbind())
    }

    /// Velocities as a NumPy array of shape (N, 3), dtype=float64.
    fn get_velocities<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let particles = self.driver.scheduler().particles();
        let mut arr = Array2::<f64>::zeros((particles.len(), DIM));
        for (i, p) in particles.iter().enumerate() {
            for k in 0..DIM {
                arr[[i, k]] = p.v[k];
            }
        }
        Ok(arr.into_pyarray(py).unbind())
    }

    /// Set all positions from a (N, 3) float64 array. Periodic axes are
    /// wrapped into the primary image; the event horizon is rebuilt, so an
    /// overlapping configuration raises ValueError.
    fn set_positions<'py>(&mut self, positions: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
        let arr = positions.as_array();
        let n = self.driver.scheduler().num_particles();
        if arr.ndim() != 2 || arr.shape()[0] != n || arr.shape()[1] != DIM {
            return Err(py_err(format!(
                "positions must have shape ({n}, {DIM}), got {:?}",
                arr.shape()
            )));
        }
        let scheduler = self.driver.scheduler_mut();
        let boundary = scheduler.boundary().clone();
        for (i, p) in scheduler.particles_mut().iter_mut().enumerate() {
            let mut r = [0.0_f64; DIM];
            for k in 0..DIM {
                r[k] = arr[[i, k]];
            }
            p.set_position(boundary.wrap(r)).map_err(py_err)?;
        }
        self.driver.reset().map_err(py_err)
    }

    /// Set all velocities from a (N, 3) float64 array and rebuild the event
    /// horizon.
    fn set_velocities<'py>(&mut self, velocities: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
        let arr = velocities.as_array();
        let n = self.driver.scheduler().num_particles();
        if arr.ndim() != 2 || arr.shape()[0] != n || arr.shape()[1] != DIM {
            return Err(py_err(format!(
                "velocities must have shape ({n}, {DIM}), got {:?}",
                arr.shape()
            )));
        }
        for (i, p) in self
            .driver
            .scheduler_mut()
            .particles_mut()
            .iter_mut()
            .enumerate()
        {
            let mut v = [0.0_f64; DIM];
            for k in 0..DIM {
                v[k] = arr[[i, k]];
            }
            p.set_velocity(v).map_err(py_err)?;
        }
        self.driver.reset().map_err(py_err)
    }

    /// Configure a momentum-resampling thermostat firing every
    /// `every_events` resolved events at the given bath temperature.
    /// With `metropolis=True` the redraw is accepted or rejected on the
    /// total-energy criterion.
    #[pyo3(signature = (every_events, temperature, metropolis=false))]
    fn enable_momentum_resample(
        &mut self,
        every_events: u64,
        temperature: f64,
        metropolis: bool,
    ) -> PyResult<()> {
        self.driver
            .set_cadence(Some(Cadence::Events(every_events)))
            .map_err(py_err)?;
        if metropolis {
            self.driver.add_action(Box::new(
                MetropolisMomentumResample::new(temperature).map_err(py_err)?,
            ));
        } else {
            self.driver
                .add_action(Box::new(MomentumResample::new(temperature).map_err(py_err)?));
        }
        Ok(())
    }
}

/// The hardsim Python module entry point.
#[pymodule]
fn hardsim(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<HardSim>()?;
    Ok(())
}
