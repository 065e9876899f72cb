use std::collections::VecDeque;

use fxhash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::{define_index_newtype, utils::enumerate_idx::IntoEnumerateIdx};

/// Bandwidth units, both for link capacities and service requirements.
pub type Bandwidth = u32;

define_index_newtype!(ServerIdx, Server);
define_index_newtype!(VnfIdx, VnfInstance);
define_index_newtype!(LinkIdx, PhysicalLink);
define_index_newtype!(VnfType, String);

/// Ordered list of physical links from one server to another.
pub type Route = SmallVec<[LinkIdx; 4]>;

#[derive(Debug, Clone, Serialize)]
pub struct Server {
    external_id: String,
}

impl Server {
    pub fn external_id(&self) -> &str {
        &self.external_id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VnfInstance {
    external_id: String,
    vnf_type: VnfType,
    server: ServerIdx,
}

impl VnfInstance {
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn vnf_type(&self) -> VnfType {
        self.vnf_type
    }

    pub fn server(&self) -> ServerIdx {
        self.server
    }
}

/// Undirected physical link.
#[derive(Debug, Clone, Serialize)]
pub struct PhysicalLink {
    external_id: String,
    endpoints: (ServerIdx, ServerIdx),
    capacity: Bandwidth,
}

impl PhysicalLink {
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn endpoints(&self) -> (ServerIdx, ServerIdx) {
        self.endpoints
    }

    pub fn capacity(&self) -> Bandwidth {
        self.capacity
    }

    /// The endpoint across the link from `server`.
    pub fn opposite(&self, server: ServerIdx) -> ServerIdx {
        if self.endpoints.0 == server {
            self.endpoints.1
        } else {
            self.endpoints.0
        }
    }
}

/// Physical substrate: servers hosting VNF instances, joined by capacitated links.
#[derive(Debug, Clone)]
pub struct Network {
    servers: Vec<Server>,
    vnfs: Vec<VnfInstance>,
    links: Vec<PhysicalLink>,
    vnf_types: Vec<String>,
    vnfs_by_type: Vec<Vec<VnfIdx>>,
    /// Per server, `(neighbour, link)` sorted by link index.
    adjacency: Vec<Vec<(ServerIdx, LinkIdx)>>,
}

/// A simple path through the network, with its server sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Path {
    servers: Vec<ServerIdx>,
    links: Route,
}

impl Path {
    fn sort_key(&self) -> (usize, &[LinkIdx]) {
        (self.links.len(), self.links.as_slice())
    }
}

impl Network {
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn vnfs(&self) -> &[VnfInstance] {
        &self.vnfs
    }

    pub fn links(&self) -> &[PhysicalLink] {
        &self.links
    }

    pub fn server(&self, index: ServerIdx) -> &Server {
        &self.servers[index]
    }

    pub fn vnf(&self, index: VnfIdx) -> &VnfInstance {
        &self.vnfs[index]
    }

    pub fn link(&self, index: LinkIdx) -> &PhysicalLink {
        &self.links[index]
    }

    pub fn num_vnfs(&self) -> usize {
        self.vnfs.len()
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn num_vnf_types(&self) -> usize {
        self.vnf_types.len()
    }

    pub fn vnf_type_name(&self, vnf_type: VnfType) -> &str {
        &self.vnf_types[vnf_type]
    }

    pub fn find_vnf_type(&self, name: &str) -> Option<VnfType> {
        self.vnf_types
            .iter()
            .position(|vnf_type| vnf_type == name)
            .map(VnfType::new)
    }

    /// Instances able to run `vnf_type`, in index order.
    pub fn vnfs_of_type(&self, vnf_type: VnfType) -> &[VnfIdx] {
        self.vnfs_by_type
            .get(vnf_type.get())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Fewest-hop path from `from` to `to` using only links of capacity at
    /// least `bandwidth`. Ties are broken towards lower link indices. Returns
    /// an empty route when `from == to`.
    pub fn shortest_path(
        &self,
        from: ServerIdx,
        to: ServerIdx,
        bandwidth: Bandwidth,
    ) -> Option<Route> {
        self.bfs(from, to, bandwidth, &[], &[])
            .map(|path| path.links)
    }

    /// Up to `k` loop-free paths from `from` to `to` over links of capacity at
    /// least `bandwidth`, ordered by hop count then link indices.
    pub fn candidate_paths(
        &self,
        from: ServerIdx,
        to: ServerIdx,
        bandwidth: Bandwidth,
        k: usize,
    ) -> Vec<Route> {
        if k == 0 {
            return vec![];
        }

        let Some(first) = self.bfs(from, to, bandwidth, &[], &[]) else {
            return vec![];
        };

        let mut accepted: Vec<Path> = vec![first];
        let mut candidates: Vec<Path> = vec![];

        while accepted.len() < k {
            let previous = &accepted[accepted.len() - 1];

            for spur_index in 0..previous.links.len() {
                let spur_server = previous.servers[spur_index];
                let root_servers = &previous.servers[..=spur_index];
                let root_links = &previous.links[..spur_index];

                let banned_links: Vec<LinkIdx> = accepted
                    .iter()
                    .filter(|path| {
                        path.servers.len() > spur_index + 1
                            && path.servers[..=spur_index] == *root_servers
                    })
                    .map(|path| path.links[spur_index])
                    .collect();
                let banned_servers = &previous.servers[..spur_index];

                if let Some(spur) =
                    self.bfs(spur_server, to, bandwidth, &banned_links, banned_servers)
                {
                    let mut servers = root_servers[..spur_index].to_vec();
                    servers.extend_from_slice(&spur.servers);
                    let mut links: Route = root_links.iter().copied().collect();
                    links.extend_from_slice(&spur.links);

                    let path = Path { servers, links };
                    if !accepted.contains(&path) && !candidates.contains(&path) {
                        candidates.push(path);
                    }
                }
            }

            let Some(best) = candidates
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.sort_key().cmp(&b.sort_key()))
                .map(|(index, _)| index)
            else {
                break;
            };

            accepted.push(candidates.swap_remove(best));
        }

        accepted.into_iter().map(|path| path.links).collect()
    }

    fn bfs(
        &self,
        from: ServerIdx,
        to: ServerIdx,
        bandwidth: Bandwidth,
        banned_links: &[LinkIdx],
        banned_servers: &[ServerIdx],
    ) -> Option<Path> {
        if from == to {
            return Some(Path {
                servers: vec![from],
                links: Route::new(),
            });
        }

        let mut parent: Vec<Option<(ServerIdx, LinkIdx)>> = vec![None; self.servers.len()];
        let mut visited = vec![false; self.servers.len()];
        for &server in banned_servers {
            visited[server.get()] = true;
        }
        visited[from.get()] = true;

        let mut queue = VecDeque::from([from]);
        while let Some(server) = queue.pop_front() {
            for &(neighbour, link) in &self.adjacency[server.get()] {
                if visited[neighbour.get()]
                    || self.links[link].capacity < bandwidth
                    || banned_links.contains(&link)
                {
                    continue;
                }

                visited[neighbour.get()] = true;
                parent[neighbour.get()] = Some((server, link));

                if neighbour == to {
                    return Some(self.unwind(from, to, &parent));
                }
                queue.push_back(neighbour);
            }
        }

        None
    }

    fn unwind(
        &self,
        from: ServerIdx,
        to: ServerIdx,
        parent: &[Option<(ServerIdx, LinkIdx)>],
    ) -> Path {
        let mut servers = vec![to];
        let mut links = Route::new();
        let mut current = to;
        while current != from {
            let Some((previous, link)) = parent[current.get()] else {
                break;
            };
            servers.push(previous);
            links.push(link);
            current = previous;
        }
        servers.reverse();
        links.reverse();
        Path { servers, links }
    }
}

#[derive(Default)]
pub struct NetworkBuilder {
    servers: Vec<Server>,
    vnfs: Vec<VnfInstance>,
    links: Vec<PhysicalLink>,
    vnf_types: Vec<String>,
    server_ids: FxHashMap<String, ServerIdx>,
}

impl NetworkBuilder {
    pub fn add_server(&mut self, external_id: impl Into<String>) -> ServerIdx {
        let external_id = external_id.into();
        let index = ServerIdx::new(self.servers.len());
        self.server_ids.insert(external_id.clone(), index);
        self.servers.push(Server { external_id });
        index
    }

    pub fn server_by_id(&self, external_id: &str) -> Option<ServerIdx> {
        self.server_ids.get(external_id).copied()
    }

    /// Registers `name` as a VNF type, returning the existing type if already known.
    pub fn add_vnf_type(&mut self, name: impl Into<String>) -> VnfType {
        let name = name.into();
        if let Some(index) = self.vnf_types.iter().position(|existing| *existing == name) {
            return VnfType::new(index);
        }
        self.vnf_types.push(name);
        VnfType::new(self.vnf_types.len() - 1)
    }

    pub fn add_vnf(
        &mut self,
        external_id: impl Into<String>,
        vnf_type: VnfType,
        server: ServerIdx,
    ) -> VnfIdx {
        self.vnfs.push(VnfInstance {
            external_id: external_id.into(),
            vnf_type,
            server,
        });
        VnfIdx::new(self.vnfs.len() - 1)
    }

    pub fn add_link(
        &mut self,
        external_id: impl Into<String>,
        a: ServerIdx,
        b: ServerIdx,
        capacity: Bandwidth,
    ) -> LinkIdx {
        self.links.push(PhysicalLink {
            external_id: external_id.into(),
            endpoints: (a, b),
            capacity,
        });
        LinkIdx::new(self.links.len() - 1)
    }

    pub fn build(self) -> Network {
        let mut adjacency = vec![vec![]; self.servers.len()];
        for (index, link) in self.links.iter().enumerate_idx::<LinkIdx>() {
            let (a, b) = link.endpoints;
            adjacency[a.get()].push((b, index));
            adjacency[b.get()].push((a, index));
        }
        for neighbours in adjacency.iter_mut() {
            neighbours.sort_by_key(|&(_, link): &(ServerIdx, LinkIdx)| link);
        }

        let mut vnfs_by_type = vec![vec![]; self.vnf_types.len()];
        for (index, vnf) in self.vnfs.iter().enumerate_idx::<VnfIdx>() {
            vnfs_by_type[vnf.vnf_type.get()].push(index);
        }

        Network {
            servers: self.servers,
            vnfs: self.vnfs,
            links: self.links,
            vnf_types: self.vnf_types,
            vnfs_by_type,
            adjacency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0 - 1 - 3 and 0 - 2 - 3, plus a thin direct link 0 - 3.
    fn diamond() -> Network {
        let mut builder = NetworkBuilder::default();
        let s: Vec<ServerIdx> = (0..4)
            .map(|i| builder.add_server(format!("s{i}")))
            .collect();
        builder.add_link("a", s[0], s[1], 10);
        builder.add_link("b", s[1], s[3], 10);
        builder.add_link("c", s[0], s[2], 10);
        builder.add_link("d", s[2], s[3], 10);
        builder.add_link("direct", s[0], s[3], 2);
        builder.build()
    }

    fn route(links: &[usize]) -> Route {
        links.iter().map(|&l| LinkIdx::new(l)).collect()
    }

    #[test]
    fn test_shortest_path_respects_bandwidth_floor() {
        let network = diamond();
        let from = ServerIdx::new(0);
        let to = ServerIdx::new(3);

        assert_eq!(network.shortest_path(from, to, 1), Some(route(&[4])));
        assert_eq!(network.shortest_path(from, to, 5), Some(route(&[0, 1])));
        assert_eq!(network.shortest_path(from, to, 11), None);
    }

    #[test]
    fn test_shortest_path_to_self_is_empty() {
        let network = diamond();
        let route = network.shortest_path(ServerIdx::new(2), ServerIdx::new(2), 100);
        assert_eq!(route, Some(Route::new()));
    }

    #[test]
    fn test_candidate_paths_ordered_by_hops() {
        let network = diamond();
        let paths = network.candidate_paths(ServerIdx::new(0), ServerIdx::new(3), 1, 5);

        assert_eq!(
            paths,
            vec![route(&[4]), route(&[0, 1]), route(&[2, 3])],
            "only three loop-free paths exist"
        );

        let wide = network.candidate_paths(ServerIdx::new(0), ServerIdx::new(3), 5, 1);
        assert_eq!(wide, vec![route(&[0, 1])]);
    }

    #[test]
    fn test_vnfs_of_type() {
        let mut builder = NetworkBuilder::default();
        let server = builder.add_server("s0");
        let firewall = builder.add_vnf_type("firewall");
        let nat = builder.add_vnf_type("nat");
        assert_eq!(builder.add_vnf_type("firewall"), firewall);

        builder.add_vnf("fw0", firewall, server);
        builder.add_vnf("fw1", firewall, server);
        let network = builder.build();

        assert_eq!(
            network.vnfs_of_type(firewall),
            &[VnfIdx::new(0), VnfIdx::new(1)]
        );
        assert!(network.vnfs_of_type(nat).is_empty());
        assert_eq!(network.find_vnf_type("nat"), Some(nat));
        assert_eq!(network.vnf_type_name(firewall), "firewall");
    }
}
