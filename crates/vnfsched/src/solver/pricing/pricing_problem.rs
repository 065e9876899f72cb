use fxhash::FxHashMap;

use crate::{
    error::ConstructionError,
    problem::{
        network::{Network, Route, ServerIdx, VnfIdx},
        service::Service,
        timeslot::Timeslot,
    },
    solver::{
        configuration::{Configuration, ServiceSchedule, build_service_configuration},
        master::capacity::ResidualCapacity,
        pricing::dual_prices::DualPrices,
    },
};

/// Everything a pricing solve reads. Shared by all services of one iteration.
#[derive(Clone, Copy)]
pub struct PricingContext<'a> {
    pub network: &'a Network,
    pub duals: &'a DualPrices,
    pub residual: &'a ResidualCapacity,
    pub earliest_start: Timeslot,
    pub candidate_paths: usize,
    pub incumbent_threshold: f64,
    pub max_incumbents: usize,
}

impl PricingContext<'_> {
    pub fn horizon(&self) -> Timeslot {
        self.residual.horizon()
    }
}

#[derive(Debug, Clone)]
pub struct PricingSolution {
    pub configuration: Configuration,
    /// `pi - cost`; improving when positive.
    pub value: f64,
}

/// Prefix sums over slots `[0, horizon)` of a per-slot price, with blocked
/// slots counted separately.
struct SlotWindows {
    cost: Vec<f64>,
    blocked: Vec<u32>,
}

impl SlotWindows {
    fn new(horizon: Timeslot, slot_price: impl Fn(Timeslot) -> Option<f64>) -> Self {
        let mut cost = Vec::with_capacity(horizon as usize + 1);
        let mut blocked = Vec::with_capacity(horizon as usize + 1);
        cost.push(0.0);
        blocked.push(0);

        for slot in 0..horizon {
            let (price, is_blocked) = match slot_price(slot) {
                Some(price) => (price, 0),
                None => (0.0, 1),
            };
            cost.push(cost[slot as usize] + price);
            blocked.push(blocked[slot as usize] + is_blocked);
        }

        SlotWindows { cost, blocked }
    }

    /// Total price of `[start, start + length)`, or `None` if any slot is
    /// blocked or the window leaves the horizon.
    fn window(&self, start: Timeslot, length: Timeslot) -> Option<f64> {
        let start = start as usize;
        let end = start + length as usize;
        if end >= self.cost.len() || self.blocked[end] != self.blocked[start] {
            return None;
        }
        Some(self.cost[end] - self.cost[start])
    }
}

struct CandidatePath {
    route: Route,
    windows: SlotWindows,
}

#[derive(Clone, Copy)]
struct Back {
    from: usize,
    path: Option<usize>,
    transmission_start: Timeslot,
    previous_finish: Timeslot,
}

#[derive(Clone, Copy)]
struct Label {
    cost: f64,
    back: Back,
}

const UNREACHED: Label = Label {
    cost: f64::INFINITY,
    back: Back {
        from: usize::MAX,
        path: None,
        transmission_start: 0,
        previous_finish: 0,
    },
};

/// Cheapest way to have one middlebox finish on each candidate at each slot.
struct Stage {
    candidates: Vec<VnfIdx>,
    /// `labels[candidate][finish]` for `finish` in `0..=horizon`.
    labels: Vec<Vec<Label>>,
}

/// Reduced-cost search for one service over a time-expanded graph.
///
/// Stages are middleboxes and a state is `(stage, VNF instance, finish slot)`.
/// Between stages the virtual link is sent over one of the candidate paths,
/// and both transmission and processing may wait. The search is exact over
/// that state space.
pub struct PricingProblem<'a> {
    context: PricingContext<'a>,
    service: &'a Service,
}

impl<'a> PricingProblem<'a> {
    pub fn new(context: PricingContext<'a>, service: &'a Service) -> Self {
        PricingProblem { context, service }
    }

    /// Returns the most valuable configuration, if any schedule fits. Every
    /// terminal state worth at least the incumbent threshold is passed to
    /// `on_incumbent`, best first.
    pub fn solve(
        &self,
        mut on_incumbent: impl FnMut(Configuration, f64),
    ) -> Result<Option<PricingSolution>, ConstructionError> {
        let Some(stages) = self.candidate_stages()? else {
            return Ok(None);
        };
        let paths = self.candidate_paths(&stages);
        let stages = self.run(stages, &paths);

        let id = self.service.id();
        let admission = self.context.duals.admission(id);
        let makespan = self.context.duals.makespan(id);

        let last = &stages[stages.len() - 1];
        let mut terminals: Vec<(f64, Timeslot, usize)> = vec![];
        for (candidate, labels) in last.labels.iter().enumerate() {
            for (finish, label) in labels.iter().enumerate() {
                if label.cost.is_finite() {
                    let value = admission - (label.cost + makespan * finish as f64);
                    terminals.push((value, finish as Timeslot, candidate));
                }
            }
        }

        // best value, then earliest finish, then lowest candidate
        terminals.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let Some(&(_, finish, candidate)) = terminals.first() else {
            return Ok(None);
        };

        for &(value, finish, candidate) in terminals
            .iter()
            .take_while(|(value, ..)| *value >= self.context.incumbent_threshold)
            .take(self.context.max_incumbents)
        {
            let configuration = self.configuration(&stages, &paths, candidate, finish)?;
            on_incumbent(configuration, value);
        }

        let configuration = self.configuration(&stages, &paths, candidate, finish)?;
        let value = self.context.duals.value(&configuration);

        Ok(Some(PricingSolution {
            configuration,
            value,
        }))
    }

    fn candidate_stages(&self) -> Result<Option<Vec<Stage>>, ConstructionError> {
        let network = self.context.network;
        let mut stages = Vec::with_capacity(self.service.middleboxes().len());

        for (index, middlebox) in self.service.middleboxes().iter().enumerate() {
            let candidates = network.vnfs_of_type(middlebox.vnf_type());
            if candidates.is_empty() {
                return Err(ConstructionError::NoCapableVnf {
                    service: self.service.id(),
                    middlebox: index,
                    vnf_type: middlebox.vnf_type(),
                });
            }
            stages.push(Stage {
                candidates: candidates.to_vec(),
                labels: vec![],
            });
        }

        if stages.is_empty() {
            return Ok(None);
        }
        Ok(Some(stages))
    }

    fn candidate_paths(
        &self,
        stages: &[Stage],
    ) -> FxHashMap<(ServerIdx, ServerIdx), Vec<CandidatePath>> {
        let network = self.context.network;
        let horizon = self.context.horizon();
        let bandwidth = self.service.bandwidth();
        let mut paths = FxHashMap::default();

        for pair in stages.windows(2) {
            for &f in &pair[0].candidates {
                for &g in &pair[1].candidates {
                    let from = network.vnf(f).server();
                    let to = network.vnf(g).server();
                    if from == to {
                        continue;
                    }

                    paths.entry((from, to)).or_insert_with(|| {
                        network
                            .candidate_paths(from, to, bandwidth, self.context.candidate_paths)
                            .into_iter()
                            .map(|route| {
                                let windows = SlotWindows::new(horizon, |slot| {
                                    let mut price = 0.0;
                                    for &link in &route {
                                        if !self
                                            .context
                                            .residual
                                            .link_available(link, slot, bandwidth)
                                        {
                                            return None;
                                        }
                                        price +=
                                            self.context.duals.link(link, slot) * bandwidth as f64;
                                    }
                                    Some(price)
                                });
                                CandidatePath { route, windows }
                            })
                            .collect()
                    });
                }
            }
        }

        paths
    }

    fn processing_windows(&self, vnf: VnfIdx) -> SlotWindows {
        let context = &self.context;
        SlotWindows::new(context.horizon(), |slot| {
            context
                .residual
                .vnf_available(vnf, slot)
                .then(|| context.duals.vnf(vnf, slot))
        })
    }

    fn run(
        &self,
        mut stages: Vec<Stage>,
        paths: &FxHashMap<(ServerIdx, ServerIdx), Vec<CandidatePath>>,
    ) -> Vec<Stage> {
        let network = self.context.network;
        let horizon = self.context.horizon();
        let earliest_start = self.context.earliest_start;
        let width = horizon as usize + 1;
        let transmission_time = self.service.transmission_time();

        for stage_index in 0..stages.len() {
            let processing_time = self.service.middlebox(stage_index).processing_time();

            // Cheapest arrival of the incoming transmission, per candidate and slot.
            let ready: Vec<Vec<Label>> = if stage_index == 0 {
                stages[0]
                    .candidates
                    .iter()
                    .map(|_| {
                        let mut labels = vec![UNREACHED; width];
                        if let Some(label) = labels.get_mut(earliest_start as usize) {
                            label.cost = 0.0;
                        }
                        labels
                    })
                    .collect()
            } else {
                let previous = &stages[stage_index - 1];
                let waiting: Vec<Vec<(f64, Timeslot)>> = previous
                    .labels
                    .iter()
                    .map(|labels| prefix_min(labels))
                    .collect();

                stages[stage_index]
                    .candidates
                    .iter()
                    .map(|&g| {
                        let mut labels = vec![UNREACHED; width];
                        let to = network.vnf(g).server();

                        for (from_index, &f) in previous.candidates.iter().enumerate() {
                            let from = network.vnf(f).server();
                            let finished = &previous.labels[from_index];

                            let routes = if from == to {
                                None
                            } else {
                                match paths.get(&(from, to)) {
                                    Some(routes) if !routes.is_empty() => Some(routes),
                                    _ => continue,
                                }
                            };

                            match routes {
                                Some(routes) if transmission_time > 0 => {
                                    for (path_index, path) in routes.iter().enumerate() {
                                        let last_start = horizon.saturating_sub(transmission_time);
                                        for start in earliest_start..=last_start {
                                            let (waited, previous_finish) =
                                                waiting[from_index][start as usize];
                                            if !waited.is_finite() {
                                                continue;
                                            }
                                            let Some(price) =
                                                path.windows.window(start, transmission_time)
                                            else {
                                                continue;
                                            };
                                            let arrival = (start + transmission_time) as usize;
                                            let cost = waited + price;
                                            if cost < labels[arrival].cost {
                                                labels[arrival] = Label {
                                                    cost,
                                                    back: Back {
                                                        from: from_index,
                                                        path: Some(path_index),
                                                        transmission_start: start,
                                                        previous_finish,
                                                    },
                                                };
                                            }
                                        }
                                    }
                                }
                                routes => {
                                    // co-located, or nothing to transmit
                                    let path = routes.map(|_| 0);
                                    for (slot, label) in finished.iter().enumerate() {
                                        if label.cost < labels[slot].cost {
                                            labels[slot] = Label {
                                                cost: label.cost,
                                                back: Back {
                                                    from: from_index,
                                                    path,
                                                    transmission_start: slot as Timeslot,
                                                    previous_finish: slot as Timeslot,
                                                },
                                            };
                                        }
                                    }
                                }
                            }
                        }

                        labels
                    })
                    .collect()
            };

            let labels: Vec<Vec<Label>> = stages[stage_index]
                .candidates
                .iter()
                .zip(&ready)
                .map(|(&vnf, ready)| {
                    let processing = self.processing_windows(vnf);
                    let waiting = prefix_min(ready);
                    let mut labels = vec![UNREACHED; width];

                    if processing_time > horizon {
                        return labels;
                    }
                    for start in earliest_start..=horizon - processing_time {
                        let (waited, arrival) = waiting[start as usize];
                        if !waited.is_finite() {
                            continue;
                        }
                        let Some(price) = processing.window(start, processing_time) else {
                            continue;
                        };
                        let finish = (start + processing_time) as usize;
                        labels[finish] = Label {
                            cost: waited + price,
                            back: ready[arrival as usize].back,
                        };
                    }

                    labels
                })
                .collect();

            stages[stage_index].labels = labels;
        }

        stages
    }

    fn configuration(
        &self,
        stages: &[Stage],
        paths: &FxHashMap<(ServerIdx, ServerIdx), Vec<CandidatePath>>,
        candidate: usize,
        finish: Timeslot,
    ) -> Result<Configuration, ConstructionError> {
        let network = self.context.network;
        let length = stages.len();
        let mut schedule = ServiceSchedule {
            mapping: vec![VnfIdx::default(); length],
            routes: vec![None; length - 1],
            processing_start: vec![0; length],
            transmission_start: vec![0; length - 1],
        };

        let mut candidate = candidate;
        let mut finish = finish;
        for stage_index in (0..length).rev() {
            let stage = &stages[stage_index];
            let vnf = stage.candidates[candidate];
            schedule.mapping[stage_index] = vnf;
            schedule.processing_start[stage_index] =
                finish - self.service.middlebox(stage_index).processing_time();

            if stage_index == 0 {
                break;
            }

            let back = stage.labels[candidate][finish as usize].back;
            let previous = stages[stage_index - 1].candidates[back.from];
            let link = stage_index - 1;
            schedule.transmission_start[link] = back.transmission_start;
            schedule.routes[link] = back.path.and_then(|path| {
                let from = network.vnf(previous).server();
                let to = network.vnf(vnf).server();
                paths
                    .get(&(from, to))
                    .and_then(|routes| routes.get(path))
                    .map(|candidate| candidate.route.clone())
            });

            candidate = back.from;
            finish = back.previous_finish;
        }

        build_service_configuration(self.service, schedule, network, self.context.horizon())
    }
}

/// `result[t]` is the cheapest label at or before `t`, with its slot.
fn prefix_min(labels: &[Label]) -> Vec<(f64, Timeslot)> {
    let mut best = (f64::INFINITY, 0);
    labels
        .iter()
        .enumerate()
        .map(|(slot, label)| {
            if label.cost < best.0 {
                best = (label.cost, slot as Timeslot);
            }
            best
        })
        .collect()
}
