//! Connection resolution through pass-through wiring.
//!
//! The host graph routes wires through bypassed nodes, nulls, switches and
//! subnet boundaries before they reach anything the compiler cares about.
//! [`resolve`] walks that indirection to the nearest meaningful producer;
//! the deadend followers walk further, treating every ordinary node as
//! transparent.

use crate::host::{HostGraph, NodeCategory, NodeRef};
use crate::TRACING_TARGET;

/// Kind of a raw external source. Only images are supported today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    /// RGBA image capture.
    Image,
}

/// The nearest meaningful producer behind an input connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSource {
    /// A compile-unit node; its fragment continues the compiled job graph.
    Graph {
        /// The compile-unit node.
        node: NodeRef,
        /// Output connector on it.
        output: usize,
    },
    /// An ordinary host node whose output must be captured and uploaded.
    Raw {
        /// The source node.
        node: NodeRef,
        /// Output connector on it.
        output: usize,
        /// Capture kind.
        kind: RawKind,
    },
}

/// Resolves the input connector of a node to its nearest meaningful
/// producer, or `None` when nothing meaningful is connected.
///
/// Wiring is assumed acyclic (the host's editing rules make cycles
/// structurally unreachable), so no cycle guard is carried.
pub fn resolve<G: HostGraph>(graph: &G, node: NodeRef, input: usize) -> Option<ResolvedSource> {
    let wire = graph.input_connection(node, input)?;
    let upstream = wire.node;

    // bypassed nodes are transparent: input index i maps onto output i
    if graph.is_bypassed(upstream) {
        return resolve(graph, upstream, wire.index);
    }

    match graph.category(upstream) {
        NodeCategory::CompileUnit => Some(ResolvedSource::Graph {
            node: upstream,
            output: wire.index,
        }),
        NodeCategory::SubnetInput => {
            // continue one level up, at the matching parent input
            let parent = graph.parent(upstream)?;
            resolve(graph, parent, wire.index)
        }
        NodeCategory::Passthrough => resolve(graph, upstream, wire.index),
        NodeCategory::Switch => resolve(graph, upstream, graph.switch_selection(upstream)),
        NodeCategory::Subnet => {
            let outputs = graph.subnet_outputs(upstream);
            match outputs.first() {
                Some(designated) => {
                    if outputs.len() > 1 {
                        // behavior for additional outputs is unspecified upstream
                        tracing::warn!(
                            target: TRACING_TARGET,
                            node = %upstream,
                            outputs = outputs.len(),
                            "following only the first output node of a multi-output subnetwork"
                        );
                    }
                    resolve(graph, *designated, wire.index)
                }
                // a network exposing no output resolves as a raw source
                None => Some(ResolvedSource::Raw {
                    node: upstream,
                    output: wire.index,
                    kind: RawKind::Image,
                }),
            }
        }
        NodeCategory::SubnetOutput | NodeCategory::Plain => Some(ResolvedSource::Raw {
            node: upstream,
            output: wire.index,
            kind: RawKind::Image,
        }),
    }
}

/// Follows an input connection through every node, indirection or not,
/// until a node with no further input is reached.
///
/// Returns the terminal `(node, input)` pair, or `None` when nothing is
/// connected at the starting connector. Used to find fallback literal
/// values carried by ordinary host-level connection chains.
pub fn follow_to_deadend<G: HostGraph>(
    graph: &G,
    node: NodeRef,
    input: usize,
) -> Option<(NodeRef, usize)> {
    graph.input_connection(node, input)?;
    Some(follow_input_until(graph, node, input, |_| false))
}

/// Deadend follower with an early-stop predicate.
///
/// Stops when `stop` matches the current node, when nothing further is
/// connected, or at the same subnet/switch boundaries [`resolve`] handles;
/// every other node is treated as transparent.
pub fn follow_input_until<G, F>(graph: &G, node: NodeRef, input: usize, stop: F) -> (NodeRef, usize)
where
    G: HostGraph,
    F: Fn(NodeRef) -> bool + Copy,
{
    if stop(node) {
        return (node, input);
    }
    let Some(wire) = graph.input_connection(node, input) else {
        return (node, input);
    };
    let upstream = wire.node;

    match graph.category(upstream) {
        NodeCategory::SubnetInput => match graph.parent(upstream) {
            Some(parent) => follow_input_until(graph, parent, wire.index, stop),
            None => (upstream, wire.index),
        },
        NodeCategory::Subnet => match graph.subnet_outputs(upstream).first() {
            Some(designated) => follow_input_until(graph, *designated, wire.index, stop),
            None => follow_input_until(graph, upstream, wire.index, stop),
        },
        NodeCategory::Switch => {
            follow_input_until(graph, upstream, graph.switch_selection(upstream), stop)
        }
        // every ordinary node is transparent here
        _ => follow_input_until(graph, upstream, wire.index, stop),
    }
}

/// Forward variant of the deadend follower: walks output connectors by the
/// mirrored indirection rules, following only the first wire leaving each
/// connector.
pub fn follow_output_until<G, F>(
    graph: &G,
    node: NodeRef,
    output: usize,
    stop: F,
) -> (NodeRef, usize)
where
    G: HostGraph,
    F: Fn(NodeRef) -> bool + Copy,
{
    if stop(node) {
        return (node, output);
    }
    let Some(wire) = graph.output_connection(node, output) else {
        return (node, output);
    };
    let downstream = wire.node;

    match graph.category(downstream) {
        NodeCategory::SubnetOutput => match graph.parent(downstream) {
            Some(parent) => follow_output_until(graph, parent, wire.index, stop),
            None => (downstream, wire.index),
        },
        NodeCategory::Subnet => match graph.subnet_inputs(downstream).first() {
            Some(designated) => follow_output_until(graph, *designated, wire.index, stop),
            None => follow_output_until(graph, downstream, wire.index, stop),
        },
        NodeCategory::Switch => follow_output_until(graph, downstream, 0, stop),
        _ => follow_output_until(graph, downstream, wire.index, stop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryGraph, MemoryNode};

    fn unit(graph: &mut MemoryGraph, path: &str) -> NodeRef {
        graph.add(MemoryNode::compile_unit(path, "{}"))
    }

    #[test]
    fn test_resolve_descends_into_subnet() {
        let mut graph = MemoryGraph::new();
        let net = graph.add(MemoryNode::subnet("/net"));
        let producer = unit(&mut graph, "/net/gen");
        let portal = graph.add(MemoryNode::subnet_output("/net/out"));
        graph.connect(producer, 0, portal, 0);
        graph.set_subnet_outputs(net, vec![portal]);
        let consumer = graph.add(MemoryNode::plain("/consumer"));
        graph.connect(net, 0, consumer, 0);

        assert_eq!(
            resolve(&graph, consumer, 0),
            Some(ResolvedSource::Graph {
                node: producer,
                output: 0
            })
        );
    }

    #[test]
    fn test_multi_output_subnet_follows_first_output_node() {
        let mut graph = MemoryGraph::new();
        let net = graph.add(MemoryNode::subnet("/net"));
        let first = unit(&mut graph, "/net/a");
        let second = unit(&mut graph, "/net/b");
        let portal_a = graph.add(MemoryNode::subnet_output("/net/out_a"));
        let portal_b = graph.add(MemoryNode::subnet_output("/net/out_b"));
        graph.connect(first, 0, portal_a, 0);
        graph.connect(second, 0, portal_b, 0);
        graph.set_subnet_outputs(net, vec![portal_a, portal_b]);
        let consumer = graph.add(MemoryNode::plain("/consumer"));
        graph.connect(net, 0, consumer, 0);

        assert_eq!(
            resolve(&graph, consumer, 0),
            Some(ResolvedSource::Graph {
                node: first,
                output: 0
            })
        );
    }

    #[test]
    fn test_resolve_crosses_subnet_input_boundary() {
        let mut graph = MemoryGraph::new();
        let source = unit(&mut graph, "/gen");
        let net = graph.add(MemoryNode::subnet("/net"));
        graph.connect(source, 0, net, 0);
        let portal = graph.add(MemoryNode::subnet_input("/net/in"));
        graph.set_parent(portal, net);
        let inner = graph.add(MemoryNode::plain("/net/consumer"));
        graph.connect(portal, 0, inner, 0);

        assert_eq!(
            resolve(&graph, inner, 0),
            Some(ResolvedSource::Graph {
                node: source,
                output: 0
            })
        );
    }

    #[test]
    fn test_subnet_without_output_nodes_resolves_raw() {
        let mut graph = MemoryGraph::new();
        let net = graph.add(MemoryNode::subnet("/net"));
        let consumer = graph.add(MemoryNode::plain("/consumer"));
        graph.connect(net, 0, consumer, 0);

        assert_eq!(
            resolve(&graph, consumer, 0),
            Some(ResolvedSource::Raw {
                node: net,
                output: 0,
                kind: RawKind::Image
            })
        );
    }

    #[test]
    fn test_follow_to_deadend_walks_ordinary_chain() {
        let mut graph = MemoryGraph::new();
        let dial = graph.add(MemoryNode::plain("/dial"));
        let mid = graph.add(MemoryNode::passthrough("/mid"));
        let consumer = unit(&mut graph, "/gen");
        graph.connect(dial, 0, mid, 0);
        graph.connect(mid, 0, consumer, 0);

        assert_eq!(follow_to_deadend(&graph, consumer, 0), Some((dial, 0)));
        assert_eq!(follow_to_deadend(&graph, consumer, 1), None);
    }

    #[test]
    fn test_follow_input_until_stops_at_predicate() {
        let mut graph = MemoryGraph::new();
        let dial = graph.add(MemoryNode::plain("/dial"));
        let mid = graph.add(MemoryNode::passthrough("/mid"));
        let consumer = unit(&mut graph, "/gen");
        graph.connect(dial, 0, mid, 0);
        graph.connect(mid, 0, consumer, 0);

        assert_eq!(
            follow_input_until(&graph, consumer, 0, |node| node == mid),
            (mid, 0)
        );
    }

    #[test]
    fn test_follow_output_until_walks_downstream() {
        let mut graph = MemoryGraph::new();
        let dial = graph.add(MemoryNode::plain("/dial"));
        let mid = graph.add(MemoryNode::passthrough("/mid"));
        let consumer = graph.add(MemoryNode::plain("/consumer"));
        graph.connect(dial, 0, mid, 0);
        graph.connect(mid, 0, consumer, 0);

        assert_eq!(
            follow_output_until(&graph, dial, 0, |_| false),
            (consumer, 0)
        );
    }
}
