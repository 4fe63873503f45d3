//! Ordering project contracts for deployment.
//!
//! Every contract's imports are resolved either to another contract being
//! deployed (a graph edge) or to an alias (already on chain, no edge). The
//! graph is then sorted so dependencies deploy first; ties keep the order
//! contracts were given in.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{CyclicImportError, Error};
use crate::imports::{ContractLocation, clean_path, resolve_relative};
use crate::program::{ImportKind, Program};
use crate::types::{Address, CadenceValue};

/// A contract to deploy, with its source and target account.
#[derive(Clone, Debug)]
pub struct Contract {
    pub name: String,
    pub location: String,
    pub account_address: Address,
    pub account_name: String,
    pub args: Vec<CadenceValue>,
    program: Program,
    /// Import token to the index of the contract it names.
    dependencies: BTreeMap<String, usize>,
    /// Import token to the alias address it resolves to.
    aliases: BTreeMap<String, Address>,
}

impl Contract {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        code: impl Into<Vec<u8>>,
        account_address: Address,
        account_name: impl Into<String>,
        args: Vec<CadenceValue>,
    ) -> Result<Self, Error> {
        let location = location.into();
        let program = Program::new(code, Some(location.clone()))?;
        Ok(Self {
            name: name.into(),
            location,
            account_address,
            account_name: account_name.into(),
            args,
            program,
            dependencies: BTreeMap::new(),
            aliases: BTreeMap::new(),
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn code(&self) -> &str {
        self.program.code()
    }

    /// Import tokens that resolved to other contracts in the plan.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    /// Import tokens that resolved to aliases, with their addresses.
    pub fn aliases(&self) -> &BTreeMap<String, Address> {
        &self.aliases
    }

    pub fn location_entry(&self) -> ContractLocation {
        ContractLocation {
            name: self.name.clone(),
            location: self.location.clone(),
            address: self.account_address,
        }
    }
}

/// Orders a set of contracts for deployment.
#[derive(Debug)]
pub struct DeploymentPlanner {
    contracts: Vec<Contract>,
    graph: DiGraph<usize, ()>,
}

impl DeploymentPlanner {
    /// Resolve every contract's imports against the set and `aliases`
    /// (keyed by location or contract name).
    pub fn new(mut contracts: Vec<Contract>, aliases: &HashMap<String, Address>) -> Result<Self, Error> {
        let by_location: HashMap<String, usize> = contracts
            .iter()
            .enumerate()
            .map(|(i, c)| (clean_path(&c.location), i))
            .collect();
        let by_name: HashMap<String, usize> = contracts
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        let aliases: HashMap<String, Address> = aliases
            .iter()
            .map(|(k, v)| (clean_path(k), *v))
            .collect();

        let mut graph = DiGraph::with_capacity(contracts.len(), contracts.len());
        let nodes: Vec<NodeIndex> = (0..contracts.len()).map(|i| graph.add_node(i)).collect();

        for (index, contract) in contracts.iter_mut().enumerate() {
            for import in contract.program.imports().to_vec() {
                let key = match import.kind {
                    ImportKind::FilePath => resolve_relative(&contract.location, &import.token),
                    ImportKind::Identifier => import.token.clone(),
                };
                let target = match import.kind {
                    ImportKind::FilePath => by_location.get(&key),
                    ImportKind::Identifier => by_name.get(&key),
                };

                if let Some(&dependency) = target.filter(|&&t| t != index) {
                    contract.dependencies.insert(import.token.clone(), dependency);
                    graph.update_edge(nodes[dependency], nodes[index], ());
                } else if let Some(address) = aliases.get(&key) {
                    contract.aliases.insert(import.token.clone(), *address);
                } else {
                    return Err(Error::DeploymentImportNotFound {
                        contract: contract.name.clone(),
                        token: import.token,
                    });
                }
            }
        }

        Ok(Self { contracts, graph })
    }

    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    /// Contracts in deployment order.
    ///
    /// Fails with [`CyclicImportError`] naming every cycle.
    pub fn sort(self) -> Result<Vec<Contract>, Error> {
        let cycles = self.cycles();
        if !cycles.is_empty() {
            return Err(CyclicImportError { cycles }.into());
        }

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.contracts.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for next in self
                .graph
                .neighbors_directed(NodeIndex::new(index), Direction::Outgoing)
            {
                let next = next.index();
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        let mut slots: Vec<Option<Contract>> = self.contracts.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect())
    }

    /// Strongly connected components of two or more contracts, by name,
    /// each in declaration order.
    fn cycles(&self) -> Vec<Vec<String>> {
        let mut components: Vec<Vec<usize>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<usize> = scc.into_iter().map(|n| n.index()).collect();
                members.sort_unstable();
                members
            })
            .collect();
        components.sort();
        components
            .into_iter()
            .map(|members| {
                members
                    .into_iter()
                    .map(|i| self.contracts[i].name.clone())
                    .collect()
            })
            .collect()
    }
}
